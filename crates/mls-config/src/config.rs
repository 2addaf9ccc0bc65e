use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Name of the settings section owned by the supervisor. The same name is
/// used for the table in `config.toml` and for the section pushed to the
/// language server.
pub const SECTION: &str = "multiLanguageServer";

/// Log verbosity level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug messages.
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// The level name as accepted by `tracing` filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// `[multiLanguageServer.<lang>]`: toggles analysis of one content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageToggle {
    /// Whether the server analyses this language.
    #[serde(default = "default_true")]
    pub enable: bool,
}

impl Default for LanguageToggle {
    fn default() -> Self {
        Self { enable: true }
    }
}

/// `[multiLanguageServer]`: the extension-scoped settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSection {
    /// Master switch. When false nothing is verified or started.
    #[serde(default = "default_true")]
    pub enable: bool,
    /// Interpreter used to run the server. Takes precedence over
    /// `python.pythonPath`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_path: Option<String>,
    /// Whether user-facing notifications are shown.
    #[serde(default = "default_true")]
    pub notifications: bool,
    /// Upper bound for the `initialize` handshake.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
    /// HTML analysis toggle.
    #[serde(default)]
    pub html: LanguageToggle,
    /// CSS analysis toggle.
    #[serde(default)]
    pub css: LanguageToggle,
    /// JSON analysis toggle.
    #[serde(default)]
    pub json: LanguageToggle,
}

fn default_true() -> bool {
    true
}

fn default_handshake_timeout() -> u64 {
    10
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            enable: true,
            python_path: None,
            notifications: true,
            handshake_timeout_secs: default_handshake_timeout(),
            html: LanguageToggle::default(),
            css: LanguageToggle::default(),
            json: LanguageToggle::default(),
        }
    }
}

/// `[python]`: the interpreter setting shared with other tooling.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PythonSection {
    /// Shared interpreter path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_path: Option<String>,
}

/// `[log]`: supervisor logging.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub level: LogLevel,
    /// Log file path. Defaults to the platform log directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Complete settings document.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Extension-scoped settings.
    #[serde(rename = "multiLanguageServer", default)]
    pub server: ServerSection,
    /// Shared interpreter settings.
    #[serde(default)]
    pub python: PythonSection,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// The `multiLanguageServer` section as JSON, in the shape the
    /// language server receives through `workspace/didChangeConfiguration`.
    pub fn section_value(&self) -> serde_json::Value {
        serde_json::to_value(&self.server).unwrap_or_else(|err| {
            tracing::warn!("could not encode settings section: {}", err);
            serde_json::Value::Null
        })
    }
}
