// serialcam: decode grayscale frames streamed over a serial line and save
// them as 24-bit bitmaps.

#[macro_use]
mod logging;

pub mod cli;
pub mod frame;
pub mod io;
pub mod output;
pub mod settings;

pub use logging::{default_log_dir, init_file_logging, stop_file_logging};

/// Entry point for the `serialcam` binary
pub fn run() {
    if let Err(e) = cli::main_with_args() {
        tlog!("[serialcam] {}", e);
        std::process::exit(1);
    }
}
