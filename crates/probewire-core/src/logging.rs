//! Log-file housekeeping for the console binary.
//!
//! The `tracing-subscriber` setup lives in the binary; this module only
//! decides where the file goes, keeps it bounded, and maps level names.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Rotate once the active log grows past 10 MiB.
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Rotated generations kept next to the active log.
pub const DEFAULT_MAX_LOG_FILES: u32 = 5;

/// File name of the active log.
pub const LOG_FILE_NAME: &str = "probewire.log";

/// Path of the active log inside `log_dir`.
pub fn log_file_in(log_dir: &Path) -> PathBuf {
    log_dir.join(LOG_FILE_NAME)
}

/// Create the parent directory of `log_path` if it is missing.
pub fn ensure_log_dir(log_path: &Path) -> io::Result<()> {
    match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Shift `probewire.log` to `.1`, `.1` to `.2` and so on once the active
/// file reaches `max_size` bytes. The generation past `max_files` is
/// deleted. A missing or small file is left alone.
pub fn rotate_log_files(log_path: &Path, max_size: u64, max_files: u32) -> io::Result<()> {
    let len = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if len < max_size {
        return Ok(());
    }

    let oldest = generation(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..max_files).rev() {
        let from = generation(log_path, n);
        if from.exists() {
            fs::rename(&from, generation(log_path, n + 1))?;
        }
    }
    fs::rename(log_path, generation(log_path, 1))?;
    tracing::debug!(path = %log_path.display(), "rotated log file");
    Ok(())
}

/// Map a configured level name to an `EnvFilter` directive; unknown
/// names fall back to `info`.
pub fn log_level_to_filter(level: &str) -> &'static str {
    match level.to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    }
}

fn generation(base: &Path, n: u32) -> PathBuf {
    let mut name = base.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{n}"));
    base.with_file_name(name)
}
