// src/io/serial/reader.rs
//
// Frame reader: consumes exactly width*height grayscale samples after a sync
// and places them into a grid in canonical order (row-major, top row first,
// left to right).
//
// Some camera firmwares send column-major with each column bottom-to-top.
// That order is normalized here, while capturing, so the vertical flip is
// applied exactly once and the encoder never has to know about it.

use std::io::Read;

use serde::{Deserialize, Serialize};

use super::stream::{ByteStream, StreamFault};
use crate::frame::{GridBuilder, PixelGrid, Rgb};
use crate::io::CaptureError;

/// Order in which the sender transmits samples
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOrder {
    /// Row by row from the top, each row left to right
    #[default]
    RowMajor,
    /// Column by column from the left, each column bottom to top
    ColumnMajorFlipped,
}

impl ScanOrder {
    /// Grid position (x, y) of the `index`-th sample on the wire
    pub fn position(&self, index: usize, width: usize, height: usize) -> (usize, usize) {
        match self {
            ScanOrder::RowMajor => (index % width, index / width),
            ScanOrder::ColumnMajorFlipped => (index / height, height - 1 - index % height),
        }
    }
}

pub struct FrameReader {
    width: usize,
    height: usize,
    order: ScanOrder,
}

impl FrameReader {
    pub fn new(width: usize, height: usize, order: ScanOrder) -> Result<Self, CaptureError> {
        if width == 0 || height == 0 {
            return Err(CaptureError::configuration(format!(
                "frame dimensions must be non-zero (got {}x{})",
                width, height
            )));
        }
        Ok(FrameReader {
            width,
            height,
            order,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Samples per frame
    pub fn frame_len(&self) -> usize {
        self.width * self.height
    }

    /// Read one full frame. The partial grid is dropped on any failure.
    pub fn read_frame<R: Read>(
        &self,
        stream: &mut ByteStream<R>,
        device: &str,
    ) -> Result<PixelGrid, CaptureError> {
        let expected = self.frame_len();
        let mut grid = GridBuilder::new(self.width, self.height);

        for index in 0..expected {
            let gray = match stream.next_byte() {
                Ok(b) => b,
                Err(StreamFault::TimedOut) | Err(StreamFault::Closed) => {
                    return Err(CaptureError::underrun(device, expected, index));
                }
                Err(StreamFault::Cancelled) => return Err(CaptureError::cancelled(device)),
                Err(StreamFault::Io(e)) => {
                    return Err(CaptureError::connection(device, format!("read error: {}", e)));
                }
            };
            let (x, y) = self.order.position(index, self.width, self.height);
            grid.set(x, y, Rgb::gray(gray));
        }

        grid.freeze().map_err(|partial| {
            // Only reachable if ScanOrder maps two samples onto one cell
            CaptureError::underrun(device, expected, partial.filled())
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
