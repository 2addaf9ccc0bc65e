//! File-system watch for the marker file and the settings files.
use std::path::{Path, PathBuf};

use notify::event::EventKind;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::LspError;
use crate::types::FileChangeType;

/// A change the supervisor cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The marker file was created, changed or deleted.
    Marker {
        /// Path of the marker file.
        path: PathBuf,
        /// What happened to it.
        change: FileChangeType,
    },
    /// One of the settings files changed.
    Config {
        /// Path of the settings file.
        path: PathBuf,
    },
}

/// Keeps the underlying watcher alive; dropping it stops the events.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Watch `root` recursively for files named `marker_name`, and the
    /// directories holding `config_files` for changes to those files.
    ///
    /// Events are delivered on `events` from the watcher's own thread.
    pub fn spawn(
        root: &Path,
        marker_name: &str,
        config_files: Vec<PathBuf>,
        events: mpsc::Sender<WatchEvent>,
    ) -> Result<Self, LspError> {
        let marker = marker_name.to_string();
        let watched_configs = config_files.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!("file watch error: {err}");
                    return;
                }
            };
            for change in classify(&event, &marker, &watched_configs) {
                if events.blocking_send(change).is_err() {
                    return;
                }
            }
        })?;

        watcher.watch(root, RecursiveMode::Recursive)?;
        for dir in config_files.iter().filter_map(|file| file.parent()) {
            if dir.starts_with(root) || !dir.is_dir() {
                continue;
            }
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
        }
        tracing::debug!(root = %root.display(), marker = marker_name, "file watch started");

        Ok(Self { _watcher: watcher })
    }
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher").finish_non_exhaustive()
    }
}

/// Map a raw notify event onto the changes it represents.
pub fn classify(event: &notify::Event, marker_name: &str, config_files: &[PathBuf]) -> Vec<WatchEvent> {
    let change = match event.kind {
        EventKind::Create(_) => FileChangeType::Created,
        EventKind::Modify(_) => FileChangeType::Changed,
        EventKind::Remove(_) => FileChangeType::Deleted,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .filter_map(|path| {
            if config_files.iter().any(|config| config == path) {
                Some(WatchEvent::Config { path: path.clone() })
            } else if path.file_name().is_some_and(|name| name == marker_name) {
                Some(WatchEvent::Marker {
                    path: path.clone(),
                    change,
                })
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use notify::event::{AccessKind, CreateKind, DataChange, ModifyKind, RemoveKind};
    use notify::Event;

    use super::*;

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn marker_events_map_to_change_types() {
        let configs: Vec<PathBuf> = Vec::new();
        let cases = [
            (EventKind::Create(CreateKind::File), FileChangeType::Created),
            (EventKind::Modify(ModifyKind::Data(DataChange::Content)), FileChangeType::Changed),
            (EventKind::Remove(RemoveKind::File), FileChangeType::Deleted),
        ];
        for (kind, expected) in cases {
            let got = classify(&event(kind, "/w/sub/.clientrc"), ".clientrc", &configs);
            assert_eq!(
                got,
                vec![WatchEvent::Marker {
                    path: PathBuf::from("/w/sub/.clientrc"),
                    change: expected
                }]
            );
        }
    }

    #[test]
    fn other_files_are_ignored() {
        let got = classify(
            &event(EventKind::Create(CreateKind::File), "/w/index.html"),
            ".clientrc",
            &[],
        );
        assert!(got.is_empty());
    }

    #[test]
    fn access_events_are_ignored() {
        let got = classify(
            &event(EventKind::Access(AccessKind::Any), "/w/.clientrc"),
            ".clientrc",
            &[],
        );
        assert!(got.is_empty());
    }

    #[test]
    fn config_files_are_reported() {
        let configs = vec![PathBuf::from("/home/u/.config/mls/config.toml")];
        let got = classify(
            &event(EventKind::Modify(ModifyKind::Any), "/home/u/.config/mls/config.toml"),
            ".clientrc",
            &configs,
        );
        assert_eq!(
            got,
            vec![WatchEvent::Config {
                path: configs[0].clone()
            }]
        );
    }

    #[tokio::test]
    async fn watcher_starts_on_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::channel(8);
        let watcher = FileWatcher::spawn(dir.path(), ".clientrc", Vec::new(), tx);
        assert!(watcher.is_ok());
    }

    #[tokio::test]
    async fn watcher_fails_on_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let (tx, _rx) = mpsc::channel(8);
        let err = FileWatcher::spawn(&missing, ".clientrc", Vec::new(), tx).unwrap_err();
        assert!(matches!(err, LspError::Watch(_)));
    }
}
