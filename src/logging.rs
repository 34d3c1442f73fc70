// src/logging.rs
//
// Diagnostics for the capture tool. Every line goes to stderr with a local
// wall-clock prefix; when a log directory is configured the same line is
// appended to a per-run file as well.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Per-run log file, mirrored by `tlog!` while set
pub(crate) static LOG_FILE: Mutex<Option<File>> = Mutex::new(None);

/// Name of the link that always points at the newest run's file
const LATEST_LINK: &str = "serialcam.log";

/// `HH:MM:SS.mmm` local time
pub(crate) fn stamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}

/// Write one already-stamped line to stderr and the log file
pub(crate) fn emit(line: &str) {
    use std::io::Write as _;
    eprintln!("{}", line);
    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(file) = guard.as_mut() {
            let _ = writeln!(file, "{}", line);
        }
    }
}

/// Start mirroring log lines into `<dir>/<YYYYmmdd-HHMMSS>-serialcam.log`.
/// Returns the new file's path.
pub fn init_file_logging(log_dir: &Path) -> Result<PathBuf, String> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| format!("cannot create log directory {}: {}", log_dir.display(), e))?;

    let name = format!("{}-{}", chrono::Local::now().format("%Y%m%d-%H%M%S"), LATEST_LINK);
    let path = log_dir.join(&name);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("cannot open log file {}: {}", path.display(), e))?;

    #[cfg(unix)]
    relink_latest(log_dir, &name);

    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(file);
    }
    emit(&format!("{} [logging] Writing log to {}", stamp(), path.display()));
    Ok(path)
}

#[cfg(unix)]
fn relink_latest(log_dir: &Path, name: &str) {
    let link = log_dir.join(LATEST_LINK);
    let _ = std::fs::remove_file(&link);
    if let Err(e) = std::os::unix::fs::symlink(name, &link) {
        eprintln!("{} [logging] Could not update {}: {}", stamp(), LATEST_LINK, e);
    }
}

/// Close the log file; later lines go to stderr only
pub fn stop_file_logging() {
    let closed = LOG_FILE.lock().map(|mut guard| guard.take().is_some()).unwrap_or(false);
    if closed {
        eprintln!("{} [logging] Log file closed", stamp());
    }
}

/// <local data dir>/serialcam/logs
pub fn default_log_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("serialcam").join("logs"))
}

/// Log a formatted line with a timestamp prefix
macro_rules! tlog {
    ($($arg:tt)*) => {
        $crate::logging::emit(&format!("{} {}", $crate::logging::stamp(), format_args!($($arg)*)))
    };
}
