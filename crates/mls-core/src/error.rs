use thiserror::Error;

/// Errors raised by the core helpers.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A platform directory could not be resolved.
    #[error("path error: {0}")]
    Path(String),

    /// Log file preparation failed.
    #[error("log file error: {0}")]
    Log(#[from] std::io::Error),
}
