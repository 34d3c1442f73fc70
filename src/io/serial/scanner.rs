// src/io/serial/scanner.rs
//
// Marker scanner: finds the sync marker that precedes every image payload.
//
// The window is a true shift register holding the last N bytes seen
// (N = marker length). It is never cleared on mismatch, so a marker that
// overlaps a false partial match (e.g. "**RDY*") is still found.

use std::collections::VecDeque;
use std::io::Read;

use super::stream::{ByteStream, StreamFault};
use crate::io::CaptureError;

pub struct MarkerScanner {
    marker: Vec<u8>,
    window: VecDeque<u8>,
}

impl MarkerScanner {
    /// Create a scanner for a non-empty marker
    pub fn new(marker: Vec<u8>) -> Result<Self, CaptureError> {
        if marker.is_empty() {
            return Err(CaptureError::configuration("sync marker must not be empty"));
        }
        let window = VecDeque::with_capacity(marker.len());
        Ok(MarkerScanner { marker, window })
    }

    pub fn marker(&self) -> &[u8] {
        &self.marker
    }

    /// Shift one byte into the window. Returns true when the window equals the marker.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.window.len() == self.marker.len() {
            self.window.pop_front();
        }
        self.window.push_back(byte);

        self.window.len() == self.marker.len() && self.window.iter().eq(self.marker.iter())
    }

    /// Forget any partially matched bytes. Called after a successful sync so
    /// payload bytes from the previous frame cannot contribute to the next match.
    pub fn reset(&mut self) {
        self.window.clear();
    }

    /// Consume bytes until the marker is seen.
    /// Returns the number of bytes consumed, including the marker itself.
    pub fn scan<R: Read>(
        &mut self,
        stream: &mut ByteStream<R>,
        device: &str,
    ) -> Result<usize, CaptureError> {
        let mut consumed = 0usize;
        loop {
            let byte = match stream.next_byte() {
                Ok(b) => b,
                Err(StreamFault::TimedOut) => {
                    return Err(CaptureError::timeout(device, "image marker"));
                }
                Err(StreamFault::Closed) => {
                    return Err(CaptureError::connection(device, "stream closed while scanning"));
                }
                Err(StreamFault::Cancelled) => return Err(CaptureError::cancelled(device)),
                Err(StreamFault::Io(e)) => {
                    return Err(CaptureError::connection(device, format!("read error: {}", e)));
                }
            };
            consumed += 1;

            if self.push(byte) {
                self.reset();
                return Ok(consumed);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::testing::ScriptedPort;
    use std::io::Cursor;
    use std::sync::{atomic::AtomicBool, Arc};
    use std::time::Duration;

    const RDY: &[u8] = b"*RDY*";

    fn stream<R: Read>(inner: R) -> ByteStream<R> {
        ByteStream::new(inner, Duration::from_millis(30), Arc::new(AtomicBool::new(false)))
    }

    #[test]
    fn test_empty_marker_rejected() {
        assert!(matches!(
            MarkerScanner::new(Vec::new()),
            Err(CaptureError::Configuration(_))
        ));
    }

    #[test]
    fn test_finds_marker_after_noise() {
        let mut scanner = MarkerScanner::new(RDY.to_vec()).unwrap();
        let mut s = stream(Cursor::new(b"garbage*RDY*\x0A\x14".to_vec()));

        let consumed = scanner.scan(&mut s, "test").unwrap();
        assert_eq!(consumed, 12);
        // Payload starts right after the marker
        assert_eq!(s.next_byte().unwrap(), 0x0A);
    }

    #[test]
    fn test_overlapping_false_start() {
        // A reset-on-mismatch scanner would lose the leading '*' of the real marker
        let mut scanner = MarkerScanner::new(RDY.to_vec()).unwrap();
        let mut s = stream(Cursor::new(b"*RD**RDY*".to_vec()));
        assert_eq!(scanner.scan(&mut s, "test").unwrap(), 9);

        // Self-overlapping marker: "AAB" inside "AAAB"
        let mut scanner = MarkerScanner::new(vec![0x41, 0x41, 0x42]).unwrap();
        let mut s = stream(Cursor::new(vec![0x41, 0x41, 0x41, 0x42]));
        assert_eq!(scanner.scan(&mut s, "test").unwrap(), 4);
    }

    #[test]
    fn test_window_is_shift_register() {
        let mut scanner = MarkerScanner::new(vec![1, 2, 1, 2, 3]).unwrap();
        let fed = [1, 2, 1, 2, 1, 2, 3];
        let hits: Vec<bool> = fed.iter().map(|&b| scanner.push(b)).collect();
        assert_eq!(hits, vec![false, false, false, false, false, false, true]);
    }

    #[test]
    fn test_no_match_on_partial_marker() {
        let mut scanner = MarkerScanner::new(RDY.to_vec()).unwrap();
        assert!(!scanner.push(b'*'));
        assert!(!scanner.push(b'R'));
        assert!(!scanner.push(b'D'));
        assert!(!scanner.push(b'Y'));
        assert!(scanner.push(b'*'));
    }

    #[test]
    fn test_silent_stream_times_out() {
        let mut scanner = MarkerScanner::new(RDY.to_vec()).unwrap();
        let mut s = stream(ScriptedPort::idle());
        let err = scanner.scan(&mut s, "COM2").unwrap_err();
        assert!(matches!(err, CaptureError::Timeout { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_noise_then_silence_times_out() {
        let mut scanner = MarkerScanner::new(RDY.to_vec()).unwrap();
        let mut s = stream(ScriptedPort::then_idle(b"*RD".to_vec()));
        assert!(matches!(
            scanner.scan(&mut s, "COM2"),
            Err(CaptureError::Timeout { .. })
        ));
    }

    #[test]
    fn test_eof_while_scanning_is_connection_error() {
        let mut scanner = MarkerScanner::new(RDY.to_vec()).unwrap();
        let mut s = stream(Cursor::new(b"*RDY".to_vec()));
        assert!(matches!(
            scanner.scan(&mut s, "COM2"),
            Err(CaptureError::Connection { .. })
        ));
    }
}
