//! Turns resolved settings into a [`LaunchSpec`].
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;

use mls_config::{FeatureToggles, Settings, SECTION};
use mls_lsp::{DocumentSelector, LaunchSpec, SyncOptions, MARKER_FILE_NAME, SUPPORTED_LANGUAGES};

/// Transport flag always passed to the server.
pub const STDIO_FLAG: &str = "--stdio";

/// Environment variable pointed at the server directory.
pub const PYTHONPATH: &str = "PYTHONPATH";

/// Where the client and its bundled server live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionLayout {
    root: PathBuf,
}

impl ExtensionLayout {
    /// A layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `server/`, put on `PYTHONPATH`.
    pub fn server_dir(&self) -> PathBuf {
        self.root.join("server")
    }

    /// `server/python_server/main.py`.
    pub fn entry_script(&self) -> PathBuf {
        self.server_dir().join("python_server").join("main.py")
    }

    /// `server/requirements.txt`.
    pub fn requirements(&self) -> PathBuf {
        self.server_dir().join("requirements.txt")
    }
}

/// `--disable-*` flags for the switched-off features, in the fixed order
/// html, css, json, notifications.
pub fn disable_flags(toggles: &FeatureToggles) -> Vec<String> {
    [
        (toggles.html_enabled, "--disable-html"),
        (toggles.css_enabled, "--disable-css"),
        (toggles.json_enabled, "--disable-json"),
        (toggles.notifications_enabled, "--disable-notifications"),
    ]
    .into_iter()
    .filter(|(enabled, _)| !enabled)
    .map(|(_, flag)| flag.to_string())
    .collect()
}

/// Build the spec on top of the current process environment.
pub fn build_launch_spec(settings: &Settings, layout: &ExtensionLayout) -> LaunchSpec {
    build_launch_spec_with_env(settings, layout, utf8_environment(std::env::vars_os()))
}

/// The variables of `vars` that are valid UTF-8. The rest cannot be
/// carried by a [`LaunchSpec`]; each is named in a warning.
fn utf8_environment(vars: impl IntoIterator<Item = (OsString, OsString)>) -> Vec<(String, String)> {
    let mut kept = Vec::new();
    for (key, value) in vars {
        match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => kept.push((key, value)),
            (Ok(key), Err(_)) => {
                tracing::warn!(%key, "not passing environment variable with a non-UTF-8 value to the server");
            }
            (Err(key), _) => {
                tracing::warn!(key = %key.to_string_lossy(), "not passing environment variable with a non-UTF-8 name to the server");
            }
        }
    }
    kept
}

/// Build the spec on top of `base_env`.
pub fn build_launch_spec_with_env(
    settings: &Settings,
    layout: &ExtensionLayout,
    base_env: impl IntoIterator<Item = (String, String)>,
) -> LaunchSpec {
    let mut arguments = vec![
        layout.entry_script().to_string_lossy().into_owned(),
        STDIO_FLAG.to_string(),
    ];
    arguments.extend(disable_flags(&settings.toggles));

    let mut environment: BTreeMap<String, String> = base_env.into_iter().collect();
    environment.insert(
        PYTHONPATH.to_string(),
        layout.server_dir().to_string_lossy().into_owned(),
    );

    LaunchSpec::new(settings.interpreter.clone(), arguments, environment)
}

/// Files of the supported languages.
pub fn document_selector() -> DocumentSelector {
    DocumentSelector::for_files(&SUPPORTED_LANGUAGES)
}

/// The settings section and the marker file.
pub fn sync_options() -> SyncOptions {
    SyncOptions {
        configuration_section: SECTION.to_string(),
        watch_file: MARKER_FILE_NAME.to_string(),
    }
}
