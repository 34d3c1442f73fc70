// src/frame/mod.rs
//
// Decoded frame representation and bitmap output.

pub mod bitmap;
pub mod grid;

pub use bitmap::{encode_bitmap, header_sizes, write_bitmap, BitmapInfo, RowPadding};
pub use grid::{GridBuilder, PixelGrid, Rgb};
