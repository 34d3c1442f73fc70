// src/settings.rs
//
// Capture settings, loaded from a TOML file. Every field has a default so a
// partial (or missing) file is valid; command-line flags override on top.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::frame::{header_sizes, RowPadding};
use crate::io::serial::{Parity, ScanOrder};
use crate::io::CaptureError;

/// Largest accepted frame side
const MAX_DIMENSION: usize = 65_535;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub serial: SerialSettings,
    #[serde(default)]
    pub frame: FrameSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SerialSettings {
    /// Device path (e.g. "/dev/ttyUSB0", "COM2")
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    /// Silence tolerated before a scan times out or a frame underruns
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// OS read timeout; bounds how quickly a stop request is noticed
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FrameSettings {
    #[serde(default = "default_width")]
    pub width: usize,
    #[serde(default = "default_height")]
    pub height: usize,
    /// ASCII marker, or "hex:" followed by hex digits
    #[serde(default = "default_marker")]
    pub marker: String,
    #[serde(default)]
    pub scan_order: ScanOrder,
    #[serde(default)]
    pub row_padding: RowPadding,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputSettings {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    /// Number used for the first auto-named bitmap
    #[serde(default = "default_first_index")]
    pub first_index: u64,
}

fn default_baud_rate() -> u32 {
    1_000_000
}
fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}
fn default_read_timeout_ms() -> u64 {
    5_000
}
fn default_poll_interval_ms() -> u64 {
    50
}
fn default_width() -> usize {
    320
}
fn default_height() -> usize {
    240
}
fn default_marker() -> String {
    "*RDY*".to_string()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}
fn default_first_index() -> u64 {
    1
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: Parity::default(),
            read_timeout_ms: default_read_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            marker: default_marker(),
            scan_order: ScanOrder::default(),
            row_padding: RowPadding::default(),
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            first_index: default_first_index(),
        }
    }
}

impl SerialSettings {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Port name for log prefixes and error messages
    pub fn device_label(&self) -> String {
        self.port.clone().unwrap_or_else(|| "<no port>".to_string())
    }
}

impl FrameSettings {
    pub fn marker_bytes(&self) -> Result<Vec<u8>, CaptureError> {
        parse_marker(&self.marker)
    }
}

/// Parse a marker string. "hex:2a5244592a" is hex, anything else is taken as ASCII.
pub fn parse_marker(marker: &str) -> Result<Vec<u8>, CaptureError> {
    let bytes = match marker.strip_prefix("hex:") {
        Some(digits) => hex::decode(digits.trim())
            .map_err(|e| CaptureError::configuration(format!("invalid hex marker '{}': {}", digits, e)))?,
        None => marker.as_bytes().to_vec(),
    };
    if bytes.is_empty() {
        return Err(CaptureError::configuration("sync marker must not be empty"));
    }
    Ok(bytes)
}

/// Default settings file location: <config dir>/serialcam/settings.toml
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("serialcam").join("settings.toml"))
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self, CaptureError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CaptureError::configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            CaptureError::configuration(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Load from an explicit path, or from the default location if it exists,
    /// or fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, CaptureError> {
        if let Some(path) = path {
            return Settings::load(path);
        }
        match default_settings_path() {
            Some(default_path) if default_path.exists() => Settings::load(&default_path),
            _ => Ok(Settings::default()),
        }
    }

    /// Write settings as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), CaptureError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CaptureError::configuration(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| CaptureError::configuration(format!("failed to serialize settings: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            CaptureError::configuration(format!("failed to write {}: {}", path.display(), e))
        })
    }

    /// Reject settings the capture loop cannot run with
    pub fn validate(&self) -> Result<(), CaptureError> {
        let frame = &self.frame;
        if frame.width == 0 || frame.height == 0 {
            return Err(CaptureError::configuration(format!(
                "frame dimensions must be non-zero (got {}x{})",
                frame.width, frame.height
            )));
        }
        if frame.width > MAX_DIMENSION || frame.height > MAX_DIMENSION {
            return Err(CaptureError::configuration(format!(
                "frame dimensions must be at most {} (got {}x{})",
                MAX_DIMENSION, frame.width, frame.height
            )));
        }
        // Area is bounded separately: the encoded file size is a u32 header field
        header_sizes(frame.width, frame.height, frame.row_padding).map_err(CaptureError::configuration)?;
        frame.marker_bytes()?;

        if self.serial.read_timeout_ms == 0 {
            return Err(CaptureError::configuration("read timeout must be non-zero"));
        }
        if self.serial.baud_rate == 0 {
            return Err(CaptureError::configuration("baud rate must be non-zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_camera() {
        let settings = Settings::default();
        assert_eq!(settings.serial.baud_rate, 1_000_000);
        assert_eq!(settings.serial.data_bits, 8);
        assert_eq!(settings.serial.stop_bits, 1);
        assert_eq!(settings.serial.parity, Parity::None);
        assert_eq!(settings.serial.read_timeout(), Duration::from_secs(5));
        assert_eq!(settings.frame.width, 320);
        assert_eq!(settings.frame.height, 240);
        assert_eq!(settings.frame.marker_bytes().unwrap(), vec![0x2A, 0x52, 0x44, 0x59, 0x2A]);
        assert_eq!(settings.output.dir, PathBuf::from("out"));
        assert_eq!(settings.output.first_index, 1);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [serial]
            port = "/dev/ttyACM0"
            baud_rate = 9600
            parity = "even"

            [frame]
            width = 160
            scan_order = "column_major_flipped"
            row_padding = "packed"
            "#,
        )
        .unwrap();

        assert_eq!(settings.serial.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(settings.serial.baud_rate, 9600);
        assert_eq!(settings.serial.parity, Parity::Even);
        assert_eq!(settings.serial.read_timeout_ms, 5_000);
        assert_eq!(settings.frame.width, 160);
        assert_eq!(settings.frame.height, 240);
        assert_eq!(settings.frame.scan_order, ScanOrder::ColumnMajorFlipped);
        assert_eq!(settings.frame.row_padding, RowPadding::Packed);
        assert_eq!(settings.output.first_index, 1);
    }

    #[test]
    fn test_parse_marker() {
        assert_eq!(parse_marker("*RDY*").unwrap(), b"*RDY*".to_vec());
        assert_eq!(parse_marker("hex:2a5244592a").unwrap(), b"*RDY*".to_vec());
        assert_eq!(parse_marker("hex:FFD8").unwrap(), vec![0xFF, 0xD8]);
        assert!(parse_marker("").is_err());
        assert!(parse_marker("hex:").is_err());
        assert!(parse_marker("hex:zz").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_frames() {
        let mut settings = Settings::default();
        settings.frame.width = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.frame.height = MAX_DIMENSION + 1;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.frame.marker = String::new();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.serial.read_timeout_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_frames_too_large_for_bitmap() {
        let mut settings = Settings::default();
        settings.frame.width = 40_000;
        settings.frame.height = 40_000;
        assert!(matches!(settings.validate(), Err(CaptureError::Configuration(_))));

        // Largest height that still fits at full width
        settings.frame.width = MAX_DIMENSION;
        settings.frame.height = 21_845;
        assert!(settings.validate().is_ok());
        settings.frame.height = 21_846;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.serial.port = Some("COM2".to_string());
        settings.frame.marker = "hex:a55a".to_string();
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.serial.port.as_deref(), Some("COM2"));
        assert_eq!(loaded.frame.marker_bytes().unwrap(), vec![0xA5, 0x5A]);
    }

    #[test]
    fn test_load_missing_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, CaptureError::Configuration(_)));
    }
}
