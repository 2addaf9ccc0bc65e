use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::overlay_config;
use crate::validate::{repair, validate};

/// Name of the settings file in both the global and project locations.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Directory holding project settings, found by walking upward.
pub const PROJECT_DIR_NAME: &str = ".mls";

/// Written into a freshly created global settings file.
const DEFAULT_CONFIG_CONTENT: &str = r#"# Multi Language Server settings
# Uncomment and edit settings below to override defaults.

# [multiLanguageServer]
# enable = true
# pythonPath = "/usr/bin/python3"
# notifications = true
# handshakeTimeoutSecs = 10

# [multiLanguageServer.html]
# enable = true

# [multiLanguageServer.css]
# enable = true

# [multiLanguageServer.json]
# enable = true

# [python]
# pythonPath = "python3"

# [log]
# level = "info"
"#;

/// A loaded settings snapshot.
#[derive(Debug)]
pub struct LoadedConfig {
    /// The merged settings, with invalid keys reset to their defaults.
    pub config: Config,
    /// The violations that were reset.
    pub repaired: Vec<ConfigError>,
}

/// Load the settings snapshot.
///
/// Starts from [`Config::default`], layers `config_dir/config.toml`
/// (written with commented defaults when missing), then the nearest
/// `.mls/config.toml` at or above `project_dir`. Keys that fail
/// validation are reset to their defaults and reported in
/// [`LoadedConfig::repaired`]; every other key keeps its value.
///
/// # Errors
///
/// Returns [`ConfigError`] on I/O or parse failure.
pub fn load_config(config_dir: &Path, project_dir: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let global_path = config_dir.join(CONFIG_FILE_NAME);
    if !global_path.exists() {
        std::fs::create_dir_all(config_dir)
            .and_then(|()| std::fs::write(&global_path, DEFAULT_CONFIG_CONTENT))
            .map_err(|e| ConfigError::CreateDefault(e.to_string()))?;
        tracing::info!("created default settings at {}", global_path.display());
    }

    let mut config = Config::default();
    for path in config_files(config_dir, project_dir) {
        let content = std::fs::read_to_string(&path)?;
        if has_settings(&content) {
            config = overlay_config(&config, &content, &path.display().to_string())?;
        }
    }

    let repaired = repair(&mut config);
    for violation in &repaired {
        tracing::warn!("{}; using the default", violation);
    }
    Ok(LoadedConfig { config, repaired })
}

/// The settings files that contribute to [`load_config`], in layering
/// order. Only files that exist are returned.
pub fn config_files(config_dir: &Path, project_dir: Option<&Path>) -> Vec<PathBuf> {
    let global_path = config_dir.join(CONFIG_FILE_NAME);
    let project_path = project_dir.and_then(find_project_config);
    std::iter::once(global_path)
        .filter(|p| p.exists())
        .chain(project_path)
        .collect()
}

/// Parse and validate a settings document without touching the disk.
///
/// # Errors
///
/// Returns [`ConfigError`] on parse or validation failure.
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml_str).map_err(|e| ConfigError::Parse {
        origin: "inline settings".to_string(),
        message: e.to_string(),
    })?;
    first_violation(&config)?;
    Ok(config)
}

fn first_violation(config: &Config) -> Result<(), ConfigError> {
    validate(config).map_err(|errors| {
        for extra in errors.iter().skip(1) {
            tracing::warn!("{}", extra);
        }
        errors
            .into_iter()
            .next()
            .unwrap_or_else(|| ConfigError::Validation {
                key: "unknown".to_string(),
                message: "validation failed".to_string(),
            })
    })
}

fn find_project_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_DIR_NAME).join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

/// True when the document has at least one line that is neither blank
/// nor a comment.
fn has_settings(content: &str) -> bool {
    content.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with('#')
    })
}
