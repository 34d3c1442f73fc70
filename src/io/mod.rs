// src/io/mod.rs
//
// Capture-side IO: serial protocol decoding and the capture session that
// drives it. Completed frames leave this module only through CaptureEvent.

pub mod capture;
mod error;
pub mod serial;

pub use capture::{grab_frame, CapturePipeline, CaptureSession};
pub use error::CaptureError;

use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::frame::PixelGrid;

// ============================================================================
// Shared Types
// ============================================================================

/// Get current time in microseconds since UNIX epoch
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Capture loop state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Disconnected,
    Scanning,
    Reading,
    Complete,
    Error,
}

impl CaptureState {
    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(self, next: CaptureState) -> bool {
        use CaptureState::*;
        matches!(
            (self, next),
            (Disconnected, Scanning)
                | (Scanning, Reading)
                | (Scanning, Error)
                | (Scanning, Disconnected)
                | (Reading, Complete)
                | (Reading, Error)
                | (Reading, Disconnected)
                | (Complete, Scanning)
                | (Complete, Disconnected)
                | (Error, Scanning)
                | (Error, Disconnected)
        )
    }
}

/// A finished frame handed from the capture loop to its consumer
#[derive(Clone, Debug)]
pub struct CapturedFrame {
    /// 1-based frame count within the session
    pub sequence: u64,
    /// Host UNIX timestamp in microseconds when the last sample arrived
    pub timestamp_us: u64,
    pub grid: PixelGrid,
}

/// Why a capture loop exited
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndReason {
    /// Stop was requested
    Stopped,
    /// Port closed or failed
    Disconnected(String),
    /// Event receiver was dropped
    ConsumerGone,
}

/// Messages from the capture loop to its consumer
#[derive(Debug)]
pub enum CaptureEvent {
    StateChanged {
        previous: CaptureState,
        current: CaptureState,
    },
    Frame(CapturedFrame),
    /// Timeout, underrun, or connection loss. Recoverable faults are followed
    /// by a return to scanning; fatal ones by `Ended`.
    Fault(CaptureError),
    Ended(EndReason),
}

// ============================================================================
// Test Support
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::io::{ErrorKind, Read};
    use std::time::Duration;

    /// What a scripted port does once its steps are used up
    enum Tail {
        /// Keep reporting read timeouts, like a live port with nothing to say
        Idle,
        Eof,
        Fail(ErrorKind),
        /// Deliver the same chunk every millisecond, forever
        Repeat(Vec<u8>),
    }

    enum Step {
        Data(Vec<u8>),
        /// Line goes quiet for this long (one timed-out read)
        Pause(Duration),
    }

    /// Fake serial port that replays a canned script
    pub(crate) struct ScriptedPort {
        steps: VecDeque<Step>,
        tail: Tail,
    }

    impl ScriptedPort {
        fn new(steps: Vec<Step>, tail: Tail) -> Self {
            ScriptedPort {
                steps: steps
                    .into_iter()
                    .filter(|s| !matches!(s, Step::Data(d) if d.is_empty()))
                    .collect(),
                tail,
            }
        }

        pub(crate) fn idle() -> Self {
            Self::new(Vec::new(), Tail::Idle)
        }

        pub(crate) fn failing(kind: ErrorKind) -> Self {
            Self::new(Vec::new(), Tail::Fail(kind))
        }

        pub(crate) fn then_idle(bytes: Vec<u8>) -> Self {
            Self::new(vec![Step::Data(bytes)], Tail::Idle)
        }

        pub(crate) fn then_eof(bytes: Vec<u8>) -> Self {
            Self::new(vec![Step::Data(bytes)], Tail::Eof)
        }

        /// `first`, then `chunk` over and over like a sender that never stops
        pub(crate) fn streaming(first: Vec<u8>, chunk: Vec<u8>) -> Self {
            Self::new(vec![Step::Data(first)], Tail::Repeat(chunk))
        }

        /// `first`, silence for `pause`, `rest`, then idle
        pub(crate) fn with_pause(first: Vec<u8>, pause: Duration, rest: Vec<u8>) -> Self {
            Self::new(
                vec![Step::Data(first), Step::Pause(pause), Step::Data(rest)],
                Tail::Idle,
            )
        }
    }

    fn timed_out() -> std::io::Error {
        std::io::Error::new(ErrorKind::TimedOut, "idle")
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.steps.front_mut() {
                Some(Step::Data(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    chunk.drain(..n);
                    if chunk.is_empty() {
                        self.steps.pop_front();
                    }
                    Ok(n)
                }
                Some(Step::Pause(pause)) => {
                    std::thread::sleep(*pause);
                    self.steps.pop_front();
                    Err(timed_out())
                }
                None => match &self.tail {
                    Tail::Idle => {
                        std::thread::sleep(Duration::from_millis(1));
                        Err(timed_out())
                    }
                    Tail::Eof => Ok(0),
                    Tail::Fail(kind) => Err(std::io::Error::new(*kind, "scripted failure")),
                    Tail::Repeat(chunk) => {
                        std::thread::sleep(Duration::from_millis(1));
                        let n = chunk.len().min(buf.len());
                        buf[..n].copy_from_slice(&chunk[..n]);
                        Ok(n)
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        use CaptureState::*;
        assert!(Disconnected.can_transition_to(Scanning));
        assert!(Scanning.can_transition_to(Reading));
        assert!(Reading.can_transition_to(Complete));
        assert!(Complete.can_transition_to(Scanning));
        assert!(Error.can_transition_to(Scanning));
        assert!(Error.can_transition_to(Disconnected));

        assert!(!Disconnected.can_transition_to(Reading));
        assert!(!Scanning.can_transition_to(Complete));
        assert!(!Complete.can_transition_to(Reading));
        assert!(!Reading.can_transition_to(Scanning));
    }
}
