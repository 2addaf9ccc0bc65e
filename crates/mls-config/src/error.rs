use thiserror::Error;

/// Errors from loading, merging or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The default global config file could not be written.
    #[error("failed to create default config: {0}")]
    CreateDefault(String),

    /// A TOML document did not parse into the settings model.
    #[error("failed to parse {origin}: {message}")]
    Parse {
        /// Where the document came from (a path or `"inline settings"`).
        origin: String,
        /// Parser message.
        message: String,
    },

    /// A value is outside its allowed range.
    #[error("invalid setting {key}: {message}")]
    Validation {
        /// Dotted settings key, e.g. `multiLanguageServer.handshakeTimeoutSecs`.
        key: String,
        /// What is wrong with the value.
        message: String,
    },

    /// Reading or writing a settings file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
