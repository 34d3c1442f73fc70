// src/io/serial/mod.rs
//
// Serial-line image protocol.
//
// Wire format, repeated once per frame:
//   <marker bytes> <width*height grayscale samples>
//
// Pieces:
// - stream: byte-at-a-time reads with timeout and cancellation
// - scanner: sync marker detection
// - reader: sample decoding into a pixel grid
// - port: opening and enumerating serial ports

pub mod port;
pub mod reader;
pub mod scanner;
pub mod stream;

pub use port::{line_settings_label, list_serial_ports, open_port, Parity, SerialPortInfo};
pub use reader::{FrameReader, ScanOrder};
pub use scanner::MarkerScanner;
pub use stream::{ByteStream, StreamFault};
