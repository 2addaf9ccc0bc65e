//! Resolution of the raw settings document into the values the supervisor
//! acts on.
use std::time::Duration;

use crate::config::Config;

/// Interpreter used when neither settings layer names one.
pub const DEFAULT_INTERPRETER: &str = "python";

/// Per-language and notification switches passed to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureToggles {
    /// HTML analysis.
    pub html_enabled: bool,
    /// CSS analysis.
    pub css_enabled: bool,
    /// JSON analysis.
    pub json_enabled: bool,
    /// User-facing notifications.
    pub notifications_enabled: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            html_enabled: true,
            css_enabled: true,
            json_enabled: true,
            notifications_enabled: true,
        }
    }
}

/// Everything the supervisor needs from settings for one start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Master switch.
    pub enabled: bool,
    /// Interpreter executable after the fallback chain.
    pub interpreter: String,
    /// Feature toggles.
    pub toggles: FeatureToggles,
    /// Bound on the `initialize` handshake.
    pub handshake_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        resolve(&Config::default())
    }
}

/// Resolve a settings snapshot.
pub fn resolve(config: &Config) -> Settings {
    let server = &config.server;
    Settings {
        enabled: server.enable,
        interpreter: resolve_interpreter(
            server.python_path.as_deref(),
            config.python.python_path.as_deref(),
        ),
        toggles: FeatureToggles {
            html_enabled: server.html.enable,
            css_enabled: server.css.enable,
            json_enabled: server.json.enable,
            notifications_enabled: server.notifications,
        },
        handshake_timeout: Duration::from_secs(server.handshake_timeout_secs),
    }
}

/// Pick the interpreter: extension setting, then the shared setting, then
/// [`DEFAULT_INTERPRETER`]. Blank values count as unset.
pub fn resolve_interpreter(extension: Option<&str>, shared: Option<&str>) -> String {
    [extension, shared]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|candidate| !candidate.is_empty())
        .unwrap_or(DEFAULT_INTERPRETER)
        .to_string()
}
