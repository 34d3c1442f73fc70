// src/io/error.rs
//
// Error taxonomy for the capture pipeline.
// Connection errors end a session; timeouts and underruns are recoverable and
// send the loop back to scanning; encoding errors never interrupt capture.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    /// Port could not be opened, or vanished mid-session
    #[error("[{device}] connection error: {message}")]
    Connection { device: String, message: String },

    /// No data arrived within the read timeout while scanning for the marker
    #[error("[{device}] timed out waiting for {operation}")]
    Timeout { device: String, operation: String },

    /// Stream went quiet (or ended) before the frame was complete
    #[error("[{device}] frame underrun: received {received} of {expected} samples")]
    Underrun {
        device: String,
        expected: usize,
        received: usize,
    },

    /// Writing or parsing a bitmap failed
    #[error("bitmap error ({}): {message}", path.display())]
    Encoding { path: PathBuf, message: String },

    /// Settings rejected before any port was opened
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Stop requested while a read was in progress
    #[error("[{device}] capture cancelled")]
    Cancelled { device: String },
}

impl CaptureError {
    pub fn connection(device: &str, message: impl Into<String>) -> Self {
        CaptureError::Connection {
            device: device.to_string(),
            message: message.into(),
        }
    }

    pub fn timeout(device: &str, operation: impl Into<String>) -> Self {
        CaptureError::Timeout {
            device: device.to_string(),
            operation: operation.into(),
        }
    }

    pub fn underrun(device: &str, expected: usize, received: usize) -> Self {
        CaptureError::Underrun {
            device: device.to_string(),
            expected,
            received,
        }
    }

    pub fn encoding(path: &Path, message: impl Into<String>) -> Self {
        CaptureError::Encoding {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        CaptureError::Configuration(message.into())
    }

    pub fn cancelled(device: &str) -> Self {
        CaptureError::Cancelled {
            device: device.to_string(),
        }
    }

    /// Whether the capture loop can go back to scanning after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CaptureError::Timeout { .. } | CaptureError::Underrun { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(CaptureError::timeout("COM2", "marker").is_recoverable());
        assert!(CaptureError::underrun("COM2", 4, 1).is_recoverable());
        assert!(!CaptureError::connection("COM2", "gone").is_recoverable());
        assert!(!CaptureError::cancelled("COM2").is_recoverable());
        assert!(!CaptureError::configuration("bad").is_recoverable());
    }

    #[test]
    fn test_display_includes_counts() {
        let err = CaptureError::underrun("/dev/ttyUSB0", 76800, 120);
        assert_eq!(
            err.to_string(),
            "[/dev/ttyUSB0] frame underrun: received 120 of 76800 samples"
        );
    }
}
