// src/frame/bitmap.rs
//
// Uncompressed 24-bit bitmap encoder and header parser.
//
// Layout:
//   File header (14 bytes): "BM", file size, 2x reserved, pixel data offset
//   Info header (40 bytes): BITMAPINFOHEADER
//   Pixel data: rows bottom-to-top, pixels as B,G,R

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::grid::PixelGrid;
use crate::io::CaptureError;

// ============================================================================
// Constants
// ============================================================================

const SIGNATURE: &[u8; 2] = b"BM";
pub const FILE_HEADER_SIZE: usize = 14;
pub const INFO_HEADER_SIZE: usize = 40;
pub const PIXEL_DATA_OFFSET: usize = FILE_HEADER_SIZE + INFO_HEADER_SIZE;
const BITS_PER_PIXEL: u16 = 24;
const BYTES_PER_PIXEL: usize = 3;
const COLOR_PLANES: u16 = 1;
const COMPRESSION_NONE: u32 = 0;
/// 72 DPI
const RESOLUTION_PPM: i32 = 2835;

// ============================================================================
// Types
// ============================================================================

/// How pixel rows are laid out in the pixel array
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowPadding {
    /// Rows padded with zeros to a 4-byte boundary (standard)
    #[default]
    Aligned,
    /// Rows written back to back with no padding
    Packed,
}

impl RowPadding {
    /// Bytes per stored row for a given pixel width
    pub fn row_stride(&self, width: usize) -> usize {
        let raw = width * BYTES_PER_PIXEL;
        match self {
            RowPadding::Aligned => (raw + 3) & !3,
            RowPadding::Packed => raw,
        }
    }

    fn checked_row_stride(&self, width: usize) -> Option<usize> {
        let raw = width.checked_mul(BYTES_PER_PIXEL)?;
        match self {
            RowPadding::Aligned => raw.checked_add(3).map(|n| n & !3),
            RowPadding::Packed => Some(raw),
        }
    }
}

/// Header fields recovered from an encoded bitmap
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BitmapInfo {
    pub file_size: u32,
    pub pixel_offset: u32,
    pub header_size: u32,
    pub width: i32,
    pub height: i32,
    pub planes: u16,
    pub bits_per_pixel: u16,
    pub compression: u32,
    pub image_size: u32,
    pub x_pixels_per_meter: i32,
    pub y_pixels_per_meter: i32,
    pub colors_used: u32,
    pub colors_important: u32,
}

// ============================================================================
// Encoding
// ============================================================================

/// Total encoded size for a grid of the given dimensions
pub fn encoded_len(width: usize, height: usize, padding: RowPadding) -> usize {
    PIXEL_DATA_OFFSET + padding.row_stride(width) * height
}

/// Size fields as written to the headers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderSizes {
    pub width: i32,
    pub height: i32,
    pub file_size: u32,
    pub image_size: u32,
}

/// Header size fields for a grid of the given dimensions.
/// Fails when any of them does not fit its header field.
pub fn header_sizes(width: usize, height: usize, padding: RowPadding) -> Result<HeaderSizes, String> {
    let too_large = || {
        format!(
            "{}x{} frame does not fit in bitmap header fields",
            width, height
        )
    };
    let file_size = padding
        .checked_row_stride(width)
        .and_then(|stride| stride.checked_mul(height))
        .and_then(|pixels| pixels.checked_add(PIXEL_DATA_OFFSET))
        .and_then(|total| u32::try_from(total).ok())
        .ok_or_else(too_large)?;
    let image_size = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(too_large)?;
    Ok(HeaderSizes {
        width: i32::try_from(width).map_err(|_| too_large())?,
        height: i32::try_from(height).map_err(|_| too_large())?,
        file_size,
        image_size,
    })
}

/// Encode a frozen grid as a 24-bit bitmap
pub fn encode_bitmap(grid: &PixelGrid, padding: RowPadding) -> Result<Vec<u8>, String> {
    let width = grid.width();
    let sizes = header_sizes(width, grid.height(), padding)?;
    let pad = padding.row_stride(width) - width * BYTES_PER_PIXEL;

    let mut out = Vec::with_capacity(sizes.file_size as usize);

    // File header
    out.extend_from_slice(SIGNATURE);
    out.extend_from_slice(&sizes.file_size.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(PIXEL_DATA_OFFSET as u32).to_le_bytes());

    // Info header
    out.extend_from_slice(&(INFO_HEADER_SIZE as u32).to_le_bytes());
    out.extend_from_slice(&sizes.width.to_le_bytes());
    out.extend_from_slice(&sizes.height.to_le_bytes());
    out.extend_from_slice(&COLOR_PLANES.to_le_bytes());
    out.extend_from_slice(&BITS_PER_PIXEL.to_le_bytes());
    out.extend_from_slice(&COMPRESSION_NONE.to_le_bytes());
    out.extend_from_slice(&sizes.image_size.to_le_bytes());
    out.extend_from_slice(&RESOLUTION_PPM.to_le_bytes());
    out.extend_from_slice(&RESOLUTION_PPM.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // palette colours
    out.extend_from_slice(&0u32.to_le_bytes()); // important colours

    // Pixel data, bottom row first
    for row in grid.rows_bottom_up() {
        for pixel in row {
            out.extend_from_slice(&pixel.to_bgr());
        }
        out.extend(std::iter::repeat(0u8).take(pad));
    }

    debug_assert_eq!(out.len(), sizes.file_size as usize);
    Ok(out)
}

/// Encode and write a bitmap to `path`
pub fn write_bitmap(grid: &PixelGrid, padding: RowPadding, path: &Path) -> Result<(), CaptureError> {
    let bytes = encode_bitmap(grid, padding).map_err(|e| CaptureError::encoding(path, e))?;
    std::fs::write(path, bytes).map_err(|e| CaptureError::encoding(path, e.to_string()))
}

// ============================================================================
// Parsing
// ============================================================================

fn le_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn le_i32(bytes: &[u8], at: usize) -> i32 {
    le_u32(bytes, at) as i32
}

impl BitmapInfo {
    /// Parse the file and info headers from the start of an encoded bitmap
    pub fn parse(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < PIXEL_DATA_OFFSET {
            return Err(format!(
                "bitmap too short: {} bytes, need at least {}",
                bytes.len(),
                PIXEL_DATA_OFFSET
            ));
        }
        if &bytes[0..2] != SIGNATURE {
            return Err(format!(
                "bad signature {:02X} {:02X}, expected \"BM\"",
                bytes[0], bytes[1]
            ));
        }

        Ok(BitmapInfo {
            file_size: le_u32(bytes, 2),
            pixel_offset: le_u32(bytes, 10),
            header_size: le_u32(bytes, 14),
            width: le_i32(bytes, 18),
            height: le_i32(bytes, 22),
            planes: le_u16(bytes, 26),
            bits_per_pixel: le_u16(bytes, 28),
            compression: le_u32(bytes, 30),
            image_size: le_u32(bytes, 34),
            x_pixels_per_meter: le_i32(bytes, 38),
            y_pixels_per_meter: le_i32(bytes, 42),
            colors_used: le_u32(bytes, 46),
            colors_important: le_u32(bytes, 50),
        })
    }

    /// Read and parse the headers of a bitmap file on disk
    pub fn read_from(path: &Path) -> Result<Self, CaptureError> {
        let bytes = std::fs::read(path).map_err(|e| CaptureError::encoding(path, e.to_string()))?;
        BitmapInfo::parse(&bytes).map_err(|e| CaptureError::encoding(path, e))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::grid::{GridBuilder, Rgb};

    fn gray_grid(width: usize, height: usize, samples: &[u8]) -> PixelGrid {
        let mut builder = GridBuilder::new(width, height);
        for (i, &g) in samples.iter().enumerate() {
            builder.set(i % width, i / width, Rgb::gray(g));
        }
        builder.freeze().expect("grid should be full")
    }

    #[test]
    fn test_packed_2x2_layout() {
        let grid = gray_grid(2, 2, &[10, 20, 30, 40]);
        let bytes = encode_bitmap(&grid, RowPadding::Packed).unwrap();

        assert_eq!(bytes.len(), 66);
        assert_eq!(&bytes[0..2], b"BM");
        assert_eq!(le_u32(&bytes, 2), 66);
        assert_eq!(le_u32(&bytes, 10), 54);
        // Bottom row (30, 40) first, then top row (10, 20)
        assert_eq!(
            &bytes[54..],
            &[30, 30, 30, 40, 40, 40, 10, 10, 10, 20, 20, 20]
        );
    }

    #[test]
    fn test_aligned_rows_are_padded() {
        let grid = gray_grid(2, 2, &[10, 20, 30, 40]);
        let bytes = encode_bitmap(&grid, RowPadding::Aligned).unwrap();

        assert_eq!(bytes.len(), 70);
        assert_eq!(le_u32(&bytes, 2), 70);
        assert_eq!(
            &bytes[54..],
            &[30, 30, 30, 40, 40, 40, 0, 0, 10, 10, 10, 20, 20, 20, 0, 0]
        );
    }

    #[test]
    fn test_stride_already_aligned() {
        // 4 pixels * 3 bytes = 12, no padding needed
        assert_eq!(RowPadding::Aligned.row_stride(4), 12);
        assert_eq!(RowPadding::Aligned.row_stride(1), 4);
        assert_eq!(RowPadding::Aligned.row_stride(3), 12);
        assert_eq!(RowPadding::Aligned.row_stride(5), 16);
        assert_eq!(RowPadding::Packed.row_stride(5), 15);
    }

    #[test]
    fn test_headers_reparse() {
        let samples: Vec<u8> = (0..15).collect();
        let grid = gray_grid(5, 3, &samples);
        let bytes = encode_bitmap(&grid, RowPadding::Aligned).unwrap();
        let info = BitmapInfo::parse(&bytes).unwrap();

        assert_eq!(info.width, 5);
        assert_eq!(info.height, 3);
        assert_eq!(info.bits_per_pixel, 24);
        assert_eq!(info.planes, 1);
        assert_eq!(info.compression, 0);
        assert_eq!(info.header_size, 40);
        assert_eq!(info.pixel_offset, 54);
        assert_eq!(info.image_size, 5 * 3 * 3);
        assert_eq!(info.x_pixels_per_meter, 2835);
        assert_eq!(info.y_pixels_per_meter, 2835);
        assert_eq!(info.colors_used, 0);
        assert_eq!(info.colors_important, 0);
        assert_eq!(info.file_size as usize, bytes.len());
    }

    #[test]
    fn test_bgr_channel_order() {
        let mut builder = GridBuilder::new(1, 1);
        builder.set(0, 0, Rgb::new(0x11, 0x22, 0x33));
        let grid = builder.freeze().unwrap();
        let bytes = encode_bitmap(&grid, RowPadding::Packed).unwrap();
        assert_eq!(&bytes[54..57], &[0x33, 0x22, 0x11]);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(BitmapInfo::parse(&[0u8; 10]).is_err());

        let grid = gray_grid(1, 1, &[0]);
        let mut bytes = encode_bitmap(&grid, RowPadding::Aligned).unwrap();
        bytes[0] = b'X';
        assert!(BitmapInfo::parse(&bytes).is_err());
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.bmp");
        let grid = gray_grid(3, 2, &[1, 2, 3, 4, 5, 6]);

        write_bitmap(&grid, RowPadding::Aligned, &path).unwrap();

        let on_disk = std::fs::metadata(&path).unwrap().len();
        let info = BitmapInfo::read_from(&path).unwrap();
        assert_eq!(info.file_size as u64, on_disk);
        assert_eq!(on_disk as usize, encoded_len(3, 2, RowPadding::Aligned));
    }

    #[test]
    fn test_header_sizes_at_u32_limit() {
        // 65535 * 3 = 196605 bytes per row, 196608 when aligned
        let fits = header_sizes(65_535, 21_845, RowPadding::Packed).unwrap();
        assert_eq!(fits.file_size, 54 + 196_605 * 21_845);
        assert_eq!(fits.image_size, 196_605 * 21_845);
        let fits = header_sizes(65_535, 21_845, RowPadding::Aligned).unwrap();
        assert_eq!(fits.file_size, 54 + 196_608 * 21_845);

        assert!(header_sizes(65_535, 21_846, RowPadding::Packed).is_err());
        assert!(header_sizes(65_535, 21_846, RowPadding::Aligned).is_err());
        assert!(header_sizes(40_000, 40_000, RowPadding::Aligned).is_err());
        assert!(header_sizes(usize::MAX, 1, RowPadding::Aligned).is_err());
    }

    #[test]
    fn test_header_sizes_match_encoded_len() {
        for (w, h) in [(1, 1), (2, 2), (5, 3), (320, 240)] {
            for padding in [RowPadding::Aligned, RowPadding::Packed] {
                let sizes = header_sizes(w, h, padding).unwrap();
                assert_eq!(sizes.file_size as usize, encoded_len(w, h, padding));
            }
        }
    }

    #[test]
    fn test_write_to_missing_dir_is_encoding_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("frame.bmp");
        let grid = gray_grid(1, 1, &[0]);

        let err = write_bitmap(&grid, RowPadding::Aligned, &path).unwrap_err();
        assert!(matches!(err, CaptureError::Encoding { .. }));
    }
}
