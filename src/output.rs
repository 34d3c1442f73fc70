// src/output.rs
//
// Where captured frames end up on disk.
//
// Frames are written as `<dir>/<n>.bmp` with `n` counting up from the
// configured first index. Existing files are never overwritten; the counter
// skips past them.

use std::path::{Path, PathBuf};

use crate::frame::{write_bitmap, RowPadding};
use crate::io::{CaptureError, CapturedFrame};
use crate::settings::OutputSettings;

pub struct FrameOutput {
    dir: PathBuf,
    next_index: u64,
    padding: RowPadding,
    current: Option<CapturedFrame>,
}

impl FrameOutput {
    pub fn new(dir: impl Into<PathBuf>, first_index: u64, padding: RowPadding) -> Self {
        Self {
            dir: dir.into(),
            next_index: first_index,
            padding,
            current: None,
        }
    }

    pub fn from_settings(settings: &OutputSettings, padding: RowPadding) -> Self {
        Self::new(settings.dir.clone(), settings.first_index, padding)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Replace the current frame
    pub fn accept(&mut self, frame: CapturedFrame) {
        self.current = Some(frame);
    }

    /// Most recently accepted frame
    pub fn current(&self) -> Option<&CapturedFrame> {
        self.current.as_ref()
    }

    /// Path the next `save_next` would write to
    pub fn next_path(&mut self) -> PathBuf {
        loop {
            let path = self.dir.join(format!("{}.bmp", self.next_index));
            if !path.exists() {
                return path;
            }
            self.next_index += 1;
        }
    }

    /// Write the current frame to the next free numbered file
    pub fn save_next(&mut self) -> Result<PathBuf, CaptureError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| CaptureError::encoding(&self.dir, e.to_string()))?;
        let path = self.next_path();
        self.save_current_to(&path)?;
        self.next_index += 1;
        Ok(path)
    }

    /// Write the current frame to an explicit path
    pub fn save_current_to(&self, path: &Path) -> Result<(), CaptureError> {
        let frame = self
            .current
            .as_ref()
            .ok_or_else(|| CaptureError::encoding(path, "no frame captured yet"))?;
        write_bitmap(&frame.grid, self.padding, path)?;
        tlog!(
            "[output] Frame {} ({}x{}) saved to {}",
            frame.sequence,
            frame.grid.width(),
            frame.grid.height(),
            path.display()
        );
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
