// src/frame/grid.rs
//
// In-memory pixel grid for one captured frame.
// A GridBuilder is filled while the frame is read off the wire and frozen into
// an immutable PixelGrid once every sample has been written.

use serde::Serialize;

// ============================================================================
// Types
// ============================================================================

/// One RGB pixel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    /// Expand a grayscale sample to an RGB triple by replication
    pub fn gray(value: u8) -> Self {
        Rgb {
            r: value,
            g: value,
            b: value,
        }
    }

    /// Bitmap channel order
    pub fn to_bgr(self) -> [u8; 3] {
        [self.b, self.g, self.r]
    }
}

/// Frozen, fully-populated frame. Rows are stored top-to-bottom.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelGrid {
    width: usize,
    height: usize,
    pixels: Vec<Rgb>,
}

impl PixelGrid {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel at column `x`, row `y` (row 0 is the top)
    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgb> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[y * self.width + x])
    }

    /// Rows top-to-bottom, for live display
    pub fn rows(&self) -> impl DoubleEndedIterator<Item = &[Rgb]> + '_ {
        self.pixels.chunks_exact(self.width)
    }

    /// Rows bottom-to-top, the order bitmap pixel arrays are stored in
    pub fn rows_bottom_up(&self) -> impl Iterator<Item = &[Rgb]> + '_ {
        self.rows().rev()
    }
}

/// In-progress frame. Tracks which cells have been written so an incomplete
/// grid can never be frozen.
#[derive(Debug)]
pub struct GridBuilder {
    width: usize,
    height: usize,
    pixels: Vec<Rgb>,
    written: Vec<bool>,
    remaining: usize,
}

impl GridBuilder {
    /// Create an empty grid. Both dimensions must be non-zero.
    pub fn new(width: usize, height: usize) -> Self {
        let len = width * height;
        GridBuilder {
            width,
            height,
            pixels: vec![Rgb::default(); len],
            written: vec![false; len],
            remaining: len,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Write a pixel. Returns false (and writes nothing) when out of bounds.
    pub fn set(&mut self, x: usize, y: usize, pixel: Rgb) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let idx = y * self.width + x;
        self.pixels[idx] = pixel;
        if !self.written[idx] {
            self.written[idx] = true;
            self.remaining -= 1;
        }
        true
    }

    /// Number of distinct cells written so far
    pub fn filled(&self) -> usize {
        self.pixels.len() - self.remaining
    }

    pub fn is_full(&self) -> bool {
        self.remaining == 0 && !self.pixels.is_empty()
    }

    /// Freeze into a PixelGrid. Hands the builder back if any cell is unwritten.
    pub fn freeze(self) -> Result<PixelGrid, GridBuilder> {
        if !self.is_full() {
            return Err(self);
        }
        Ok(PixelGrid {
            width: self.width,
            height: self.height,
            pixels: self.pixels,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
