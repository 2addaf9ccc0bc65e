//! Log-file helpers.
//!
//! The `tracing-subscriber` setup lives in the binary; this module only
//! decides where the file goes, keeps it bounded, and turns a configured
//! level into a filter directive.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::paths::PlatformPaths;

/// Size at which the active log file is rotated (10 MB).
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Rotated generations kept next to the active file.
pub const DEFAULT_MAX_LOG_FILES: u32 = 5;

/// File name of the active log.
pub const LOG_FILE_NAME: &str = "mls.log";

/// Crates whose events follow the configured level. Everything else is
/// held at `warn`.
const WORKSPACE_TARGETS: [&str; 5] = ["mls", "mls_core", "mls_config", "mls_lsp", "mls_supervisor"];

/// Default location of the active log file.
pub fn default_log_file_path(paths: &dyn PlatformPaths) -> PathBuf {
    paths.log_dir().join(LOG_FILE_NAME)
}

/// Create the log directory and rotate the active file if it is too big.
///
/// Rotation shifts `mls.log.N` to `mls.log.N+1`, drops the generation
/// past `max_files`, and moves the active file to `mls.log.1`. A missing
/// or small file is left alone.
pub fn prepare_log_file(log_path: &Path, max_size: u64, max_files: u32) -> io::Result<()> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    if size < max_size || max_files == 0 {
        return Ok(());
    }

    let oldest = generation_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for generation in (1..max_files).rev() {
        let from = generation_path(log_path, generation);
        if from.exists() {
            fs::rename(&from, generation_path(log_path, generation + 1))?;
        }
    }
    fs::rename(log_path, generation_path(log_path, 1))
}

/// Normalise a level name; unknown names map to `info`.
pub fn normalize_level(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}

/// Build an `EnvFilter` directive that applies `level` to the workspace
/// crates and keeps dependencies at `warn`.
pub fn filter_directive(level: &str) -> String {
    let level = normalize_level(level);
    let mut directive = String::from("warn");
    for target in WORKSPACE_TARGETS {
        directive.push(',');
        directive.push_str(target);
        directive.push('=');
        directive.push_str(level);
    }
    directive
}

fn generation_path(base: &Path, generation: u32) -> PathBuf {
    let mut name = base
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| LOG_FILE_NAME.into());
    name.push(format!(".{generation}"));
    base.with_file_name(name)
}
