use std::path::PathBuf;

use crate::error::CoreError;

/// Application name used for every platform directory.
pub const APP_DIR_NAME: &str = "mls";

/// Standard directories the supervisor reads from and writes to.
pub trait PlatformPaths: Send + Sync {
    /// Directory holding the global `config.toml`.
    fn config_dir(&self) -> PathBuf;
    /// Directory for persistent application data.
    fn data_dir(&self) -> PathBuf;
    /// Directory for log files (`<data_dir>/logs`).
    fn log_dir(&self) -> PathBuf;
}

/// [`PlatformPaths`] backed by the `dirs` crate.
#[derive(Debug, Clone)]
pub struct DefaultPaths {
    config_base: PathBuf,
    data_base: PathBuf,
}

impl DefaultPaths {
    /// Resolve the platform base directories.
    ///
    /// Falls back to `~/.config` and `~/.local/share` when the platform
    /// does not report dedicated locations.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Path` when not even a home directory is known.
    pub fn new() -> Result<Self, CoreError> {
        let home = dirs::home_dir()
            .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
            .ok_or_else(|| CoreError::Path("could not determine home directory".into()))?;
        let config_base = dirs::config_dir().unwrap_or_else(|| home.join(".config"));
        let data_base = dirs::data_local_dir().unwrap_or_else(|| home.join(".local").join("share"));
        Ok(Self {
            config_base,
            data_base,
        })
    }

    /// Build paths rooted at explicit base directories.
    pub fn with_bases(config_base: impl Into<PathBuf>, data_base: impl Into<PathBuf>) -> Self {
        Self {
            config_base: config_base.into(),
            data_base: data_base.into(),
        }
    }
}

impl PlatformPaths for DefaultPaths {
    fn config_dir(&self) -> PathBuf {
        self.config_base.join(APP_DIR_NAME)
    }

    fn data_dir(&self) -> PathBuf {
        self.data_base.join(APP_DIR_NAME)
    }

    fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }
}
