//! Settings read from the global and project `config.toml` files.
use std::path::PathBuf;
use std::sync::Mutex;

use mls_config::{config_files, load_config, Config};
use mls_supervisor::{SettingsSnapshot, SettingsSource};

/// Re-reads the settings files on every snapshot.
#[derive(Debug)]
pub(crate) struct FileSettings {
    config_dir: PathBuf,
    project_dir: PathBuf,
    last_good: Mutex<Option<Config>>,
}

impl FileSettings {
    pub(crate) fn new(config_dir: PathBuf, project_dir: PathBuf) -> Self {
        Self {
            config_dir,
            project_dir,
            last_good: Mutex::new(None),
        }
    }

    /// The settings files that currently exist, global first.
    pub(crate) fn files(&self) -> Vec<PathBuf> {
        config_files(&self.config_dir, Some(&self.project_dir))
    }

    fn last_good(&self) -> std::sync::MutexGuard<'_, Option<Config>> {
        self.last_good
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Used when the files cannot be read and nothing was read before: the
/// server stays off until the settings are fixed.
fn disabled_defaults() -> Config {
    let mut config = Config::default();
    config.server.enable = false;
    config
}

impl SettingsSource for FileSettings {
    fn load(&self) -> SettingsSnapshot {
        match load_config(&self.config_dir, Some(&self.project_dir)) {
            Ok(loaded) => {
                *self.last_good() = Some(loaded.config.clone());
                SettingsSnapshot {
                    config: loaded.config,
                    problems: loaded
                        .repaired
                        .iter()
                        .map(|violation| format!("{violation}; using the default"))
                        .collect(),
                }
            }
            Err(e) => {
                tracing::error!("settings load failed: {}", e);
                let (config, fallback) = match self.last_good().clone() {
                    Some(previous) => (previous, "keeping the previous settings"),
                    None => (
                        disabled_defaults(),
                        "the language server stays disabled until they are fixed",
                    ),
                };
                SettingsSnapshot {
                    config,
                    problems: vec![format!("Settings could not be read ({e}); {fallback}")],
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mls_config::resolve;

    use super::*;

    fn write_global(dir: &std::path::Path, content: &str) {
        std::fs::write(dir.join("config.toml"), content).unwrap();
    }

    #[test]
    fn project_settings_override_global() {
        let config_dir = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        write_global(config_dir.path(), "[python]\npythonPath = \"python3\"\n");
        std::fs::create_dir_all(project.path().join(".mls")).unwrap();
        std::fs::write(
            project.path().join(".mls").join("config.toml"),
            "[multiLanguageServer.css]\nenable = false\n",
        )
        .unwrap();

        let settings = FileSettings::new(config_dir.path().to_path_buf(), project.path().to_path_buf());
        let snapshot = settings.load();
        assert_eq!(snapshot.config.python.python_path.as_deref(), Some("python3"));
        assert!(!snapshot.config.server.css.enable);
        assert!(snapshot.problems.is_empty());
        assert_eq!(settings.files().len(), 2);
    }

    #[test]
    fn invalid_value_is_reset_without_losing_other_keys() {
        let config_dir = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        write_global(
            config_dir.path(),
            "[multiLanguageServer]\nnotifications = false\nhandshakeTimeoutSecs = 0\n",
        );

        let settings = FileSettings::new(config_dir.path().to_path_buf(), project.path().to_path_buf());
        let snapshot = settings.load();
        assert!(!snapshot.config.server.notifications);
        assert_eq!(snapshot.config.server.handshake_timeout_secs, 10);
        assert_eq!(snapshot.problems.len(), 1);
        assert!(snapshot.problems[0].contains("handshakeTimeoutSecs"));
    }

    #[test]
    fn disabled_server_stays_disabled_next_to_an_invalid_value() {
        let config_dir = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        write_global(
            config_dir.path(),
            "[multiLanguageServer]\nenable = false\nhandshakeTimeoutSecs = 0\n",
        );

        let settings = FileSettings::new(config_dir.path().to_path_buf(), project.path().to_path_buf());
        assert!(!resolve(&settings.load().config).enabled);
    }

    #[test]
    fn unreadable_settings_without_history_disable_the_server() {
        let config_dir = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        write_global(config_dir.path(), "[multiLanguageServer]\nenable = false\n[log]\nlevel = \n");

        let settings = FileSettings::new(config_dir.path().to_path_buf(), project.path().to_path_buf());
        let snapshot = settings.load();
        assert!(!resolve(&snapshot.config).enabled);
        assert_eq!(snapshot.problems.len(), 1);
        assert!(snapshot.problems[0].contains("stays disabled"));
    }

    #[test]
    fn unreadable_settings_keep_the_previous_snapshot() {
        let config_dir = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        write_global(config_dir.path(), "[python]\npythonPath = \"python3\"\n");
        let settings = FileSettings::new(config_dir.path().to_path_buf(), project.path().to_path_buf());
        assert!(settings.load().problems.is_empty());

        write_global(config_dir.path(), "[python\npythonPath = \n");
        let snapshot = settings.load();
        assert_eq!(snapshot.config.python.python_path.as_deref(), Some("python3"));
        assert!(snapshot.config.server.enable);
        assert!(snapshot.problems[0].contains("keeping the previous settings"));
    }
}
