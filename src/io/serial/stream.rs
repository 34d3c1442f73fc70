// src/io/serial/stream.rs
//
// Byte-at-a-time view over a serial port (or any io::Read).
//
// The port is opened with a short OS read timeout and polled. Each poll is a
// chance to observe the stop flag, and silence is accumulated until the
// configured read timeout is exceeded. This gives prompt cancellation without
// giving up a long protocol-level timeout.

use std::io::{ErrorKind, Read};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

const CHUNK_SIZE: usize = 256;

/// Why `next_byte` could not produce a byte
#[derive(Debug)]
pub enum StreamFault {
    /// No data arrived within the read timeout
    TimedOut,
    /// Port returned EOF (device unplugged or stream ended)
    Closed,
    /// Stop flag was raised
    Cancelled,
    /// Any other read error
    Io(std::io::Error),
}

pub struct ByteStream<R> {
    inner: R,
    buf: [u8; CHUNK_SIZE],
    pos: usize,
    len: usize,
    read_timeout: Duration,
    cancel_flag: Arc<AtomicBool>,
    closed: bool,
    consumed: u64,
}

impl<R: Read> ByteStream<R> {
    pub fn new(inner: R, read_timeout: Duration, cancel_flag: Arc<AtomicBool>) -> Self {
        Self {
            inner,
            buf: [0u8; CHUNK_SIZE],
            pos: 0,
            len: 0,
            read_timeout,
            cancel_flag,
            closed: false,
            consumed: 0,
        }
    }

    /// Next byte from the stream, blocking for at most the read timeout
    pub fn next_byte(&mut self) -> Result<u8, StreamFault> {
        if self.cancel_flag.load(Ordering::Relaxed) {
            return Err(StreamFault::Cancelled);
        }

        if self.pos < self.len {
            let byte = self.buf[self.pos];
            self.pos += 1;
            self.consumed += 1;
            return Ok(byte);
        }

        if self.closed {
            return Err(StreamFault::Closed);
        }

        let started = Instant::now();
        loop {
            match self.inner.read(&mut self.buf) {
                Ok(0) => {
                    self.closed = true;
                    return Err(StreamFault::Closed);
                }
                Ok(n) => {
                    self.len = n;
                    self.pos = 1;
                    self.consumed += 1;
                    return Ok(self.buf[0]);
                }
                Err(ref e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) =>
                {
                    // Idle poll
                }
                Err(e) => return Err(StreamFault::Io(e)),
            }

            if self.cancel_flag.load(Ordering::Relaxed) {
                return Err(StreamFault::Cancelled);
            }
            if started.elapsed() >= self.read_timeout {
                return Err(StreamFault::TimedOut);
            }
        }
    }

    /// Whether the underlying port has reported EOF
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Total bytes handed out so far
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Release the wrapped port
    pub fn into_inner(self) -> R {
        self.inner
    }
}

// ============================================================================
// Tests
// ============================================================================
