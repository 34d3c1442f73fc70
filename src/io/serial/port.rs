// src/io/serial/port.rs
//
// Serial port opening and enumeration (serialport crate).

use serde::{Deserialize, Serialize};
use serialport::{DataBits, Parity as SpParity, SerialPort, StopBits};

use crate::io::CaptureError;
use crate::settings::SerialSettings;

// ============================================================================
// Types
// ============================================================================

/// Parity setting for serial port configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl Parity {
    fn to_serialport(self) -> SpParity {
        match self {
            Parity::None => SpParity::None,
            Parity::Odd => SpParity::Odd,
            Parity::Even => SpParity::Even,
        }
    }

    fn letter(self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        }
    }
}

/// Information about an available serial port
#[derive(Clone, Debug, Serialize)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

// ============================================================================
// Conversion Functions
// ============================================================================

fn to_serialport_data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

fn to_serialport_stop_bits(bits: u8) -> StopBits {
    match bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    }
}

/// Short line-settings label, e.g. "8N1"
pub fn line_settings_label(settings: &SerialSettings) -> String {
    format!(
        "{}{}{}",
        settings.data_bits,
        settings.parity.letter(),
        settings.stop_bits
    )
}

// ============================================================================
// Port Access
// ============================================================================

/// Open the configured port.
/// The OS-level timeout is the poll interval; the protocol timeout is
/// enforced by ByteStream on top of it.
pub fn open_port(settings: &SerialSettings) -> Result<Box<dyn SerialPort>, CaptureError> {
    let name = settings
        .port
        .as_deref()
        .ok_or_else(|| CaptureError::configuration("no serial port configured"))?;

    serialport::new(name, settings.baud_rate)
        .data_bits(to_serialport_data_bits(settings.data_bits))
        .stop_bits(to_serialport_stop_bits(settings.stop_bits))
        .parity(settings.parity.to_serialport())
        .timeout(settings.poll_interval())
        .open()
        .map_err(|e| CaptureError::connection(name, e.to_string()))
}

/// List available serial ports
///
/// On macOS, filters out /dev/tty.* devices and only shows /dev/cu.* devices.
/// The tty devices block on open waiting for carrier detect.
pub fn list_serial_ports() -> Result<Vec<SerialPortInfo>, CaptureError> {
    let ports = serialport::available_ports()
        .map_err(|e| CaptureError::connection("enumerate", e.to_string()))?;

    Ok(ports
        .into_iter()
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(|p| {
            let (port_type, manufacturer, product, serial_number, vid, pid) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => (
                    "USB".to_string(),
                    info.manufacturer,
                    info.product,
                    info.serial_number,
                    Some(info.vid),
                    Some(info.pid),
                ),
                serialport::SerialPortType::BluetoothPort => {
                    ("Bluetooth".to_string(), None, None, None, None, None)
                }
                serialport::SerialPortType::PciPort => ("PCI".to_string(), None, None, None, None, None),
                serialport::SerialPortType::Unknown => {
                    ("Unknown".to_string(), None, None, None, None, None)
                }
            };
            SerialPortInfo {
                port_name: p.port_name,
                port_type,
                manufacturer,
                product,
                serial_number,
                vid,
                pid,
            }
        })
        .collect())
}

// ============================================================================
// Tests
// ============================================================================
