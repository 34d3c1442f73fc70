// src/cli.rs
//
// Command-line front end. Diagnostics go to stderr through tlog!; command
// results (port lists, header dumps, saved paths) go to stdout.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::frame::BitmapInfo;
use crate::io::serial::{list_serial_ports, SerialPortInfo};
use crate::io::{grab_frame, now_us, CaptureError, CaptureEvent, CaptureSession, CapturedFrame, EndReason};
use crate::logging;
use crate::output::FrameOutput;
use crate::settings::{default_settings_path, Settings};

#[derive(Parser, Debug)]
#[command(name = "serialcam", version, about = "Capture grayscale frames from a serial camera")]
pub struct Cli {
    /// Settings file (defaults to <config dir>/serialcam/settings.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Mirror log output to a file, optionally in DIR
    #[arg(long, global = true, value_name = "DIR", num_args = 0..=1)]
    log_dir: Option<Option<PathBuf>>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available serial ports
    ListPorts {
        #[arg(long)]
        json: bool,
    },
    /// Capture frames until interrupted, disconnected, or --frames are saved
    Capture {
        #[command(flatten)]
        overrides: Overrides,
        /// Stop after this many frames
        #[arg(long)]
        frames: Option<u64>,
    },
    /// Capture a single frame and write it to --output
    Grab {
        #[command(flatten)]
        overrides: Overrides,
        #[arg(short, long)]
        output: PathBuf,
        /// Attempts before giving up on timeouts and short frames
        #[arg(long, default_value_t = 3)]
        attempts: u32,
    },
    /// Print the headers of a bitmap file
    Inspect {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Write the effective settings to the settings file
    WriteConfig {
        #[command(flatten)]
        overrides: Overrides,
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Flags that override the settings file
#[derive(Args, Debug, Default)]
struct Overrides {
    #[arg(short, long)]
    port: Option<String>,
    #[arg(short, long)]
    baud: Option<u32>,
    #[arg(long)]
    width: Option<usize>,
    #[arg(long)]
    height: Option<usize>,
    /// ASCII marker, or "hex:" followed by hex digits
    #[arg(long)]
    marker: Option<String>,
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

impl Overrides {
    fn apply(&self, settings: &mut Settings) {
        if let Some(port) = &self.port {
            settings.serial.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            settings.serial.baud_rate = baud;
        }
        if let Some(width) = self.width {
            settings.frame.width = width;
        }
        if let Some(height) = self.height {
            settings.frame.height = height;
        }
        if let Some(marker) = &self.marker {
            settings.frame.marker = marker.clone();
        }
        if let Some(dir) = &self.out_dir {
            settings.output.dir = dir.clone();
        }
    }
}

/// Parse arguments and run the selected command
pub fn main_with_args() -> Result<(), CaptureError> {
    let cli = Cli::parse();

    if let Some(dir) = &cli.log_dir {
        let dir = dir
            .clone()
            .or_else(logging::default_log_dir)
            .ok_or_else(|| CaptureError::configuration("no log directory available"))?;
        logging::init_file_logging(&dir).map_err(CaptureError::configuration)?;
    }

    let result = dispatch(&cli);
    logging::stop_file_logging();
    result
}

fn dispatch(cli: &Cli) -> Result<(), CaptureError> {
    let config = cli.config.as_deref();
    match &cli.command {
        Command::ListPorts { json } => list_ports(*json),
        Command::Capture { overrides, frames } => {
            let settings = load_settings(config, overrides)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|e| CaptureError::configuration(format!("failed to start runtime: {}", e)))?;
            runtime.block_on(capture(settings, *frames))
        }
        Command::Grab {
            overrides,
            output,
            attempts,
        } => grab(load_settings(config, overrides)?, output, *attempts),
        Command::Inspect { file, json } => inspect(file, *json),
        Command::WriteConfig { overrides, force } => write_config(config, overrides, *force),
    }
}

fn load_settings(config: Option<&Path>, overrides: &Overrides) -> Result<Settings, CaptureError> {
    let mut settings = Settings::load_or_default(config)?;
    overrides.apply(&mut settings);
    settings.validate()?;
    Ok(settings)
}

// ============================================================================
// Commands
// ============================================================================

fn list_ports(json: bool) -> Result<(), CaptureError> {
    let ports = list_serial_ports()?;
    if json {
        println!("{}", to_json(&ports)?);
        return Ok(());
    }
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in &ports {
        println!("{}", describe_port(port));
    }
    Ok(())
}

fn describe_port(port: &SerialPortInfo) -> String {
    let mut line = format!("{:<24} {}", port.port_name, port.port_type);
    if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        line.push_str(&format!(" {:04x}:{:04x}", vid, pid));
    }
    for detail in [&port.manufacturer, &port.product, &port.serial_number].into_iter().flatten() {
        line.push(' ');
        line.push_str(detail);
    }
    line
}

async fn capture(settings: Settings, frames: Option<u64>) -> Result<(), CaptureError> {
    let device = settings.serial.device_label();
    let mut output = FrameOutput::from_settings(&settings.output, settings.frame.row_padding);
    let mut session = CaptureSession::new(settings)?;
    let mut rx = session.start().await?;

    let mut captured: u64 = 0;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(CaptureEvent::Frame(frame)) => {
                    captured += 1;
                    output.accept(frame);
                    match output.save_next() {
                        Ok(path) => println!("{}", path.display()),
                        Err(e) => tlog!("[output] {}", e),
                    }
                    if frames.is_some_and(|limit| captured >= limit) {
                        break;
                    }
                }
                Some(CaptureEvent::Ended(_)) | None => break,
                Some(CaptureEvent::StateChanged { .. }) | Some(CaptureEvent::Fault(_)) => {}
            },
            _ = &mut ctrl_c => {
                tlog!("[capture:{}] Interrupted", device);
                break;
            }
        }
    }

    // Nothing reads events past this point
    drop(rx);
    let reason = session.stop().await?;
    tlog!(
        "[capture:{}] {} frame(s) captured into {}",
        device,
        captured,
        output.dir().display()
    );

    match reason {
        Some(EndReason::Disconnected(message)) => Err(CaptureError::connection(&device, message)),
        _ => Ok(()),
    }
}

fn grab(settings: Settings, path: &Path, attempts: u32) -> Result<(), CaptureError> {
    let grid = grab_frame(&settings, attempts)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| CaptureError::encoding(path, e.to_string()))?;
    }
    let mut output = FrameOutput::from_settings(&settings.output, settings.frame.row_padding);
    output.accept(CapturedFrame {
        sequence: 1,
        timestamp_us: now_us(),
        grid,
    });
    output.save_current_to(path)?;
    println!("{}", path.display());
    Ok(())
}

fn inspect(file: &Path, json: bool) -> Result<(), CaptureError> {
    let info = BitmapInfo::read_from(file)?;
    if json {
        println!("{}", to_json(&info)?);
        return Ok(());
    }
    println!("file size       {}", info.file_size);
    println!("pixel offset    {}", info.pixel_offset);
    println!("header size     {}", info.header_size);
    println!("dimensions      {}x{}", info.width, info.height);
    println!("planes          {}", info.planes);
    println!("bits per pixel  {}", info.bits_per_pixel);
    println!("compression     {}", info.compression);
    println!("image size      {}", info.image_size);
    println!(
        "resolution      {}x{} px/m",
        info.x_pixels_per_meter, info.y_pixels_per_meter
    );
    println!("colors          {} used, {} important", info.colors_used, info.colors_important);
    Ok(())
}

fn write_config(config: Option<&Path>, overrides: &Overrides, force: bool) -> Result<(), CaptureError> {
    let path = config
        .map(Path::to_path_buf)
        .or_else(default_settings_path)
        .ok_or_else(|| CaptureError::configuration("no settings path available"))?;
    if path.exists() && !force {
        return Err(CaptureError::configuration(format!(
            "{} already exists (use --force to replace it)",
            path.display()
        )));
    }

    let mut settings = if path.exists() {
        Settings::load(&path)?
    } else {
        Settings::default()
    };
    overrides.apply(&mut settings);
    settings.validate()?;
    settings.save(&path)?;
    println!("{}", path.display());
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, CaptureError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CaptureError::configuration(format!("failed to serialize output: {}", e)))
}

// ============================================================================
// Tests
// ============================================================================
