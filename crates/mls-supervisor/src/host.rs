//! Seams between the supervisor and the world around it.
//!
//! The supervisor never touches a terminal, a process table or a settings
//! file directly; it goes through these traits so that each collaborator
//! can be replaced in tests.
use std::io;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use mls_config::Config;
use mls_core::OutputChannel;
use mls_lsp::{
    ExitWatch, FileChangeType, LaunchSpec, LspError, Session, SessionId, SessionOptions,
};

use crate::error::HostError;

/// The user-facing surface: notifications, prompts, progress.
#[async_trait]
pub trait Host: Send + Sync {
    /// Show an informational notification.
    fn show_info(&self, message: &str);

    /// Show an error notification.
    fn show_error(&self, message: &str);

    /// Ask the user to pick one of `choices`. `Ok(None)` means the prompt
    /// was dismissed.
    async fn prompt(&self, message: &str, choices: &[&str]) -> Result<Option<String>, HostError>;

    /// Show a non-cancellable progress indicator.
    fn begin_progress(&self, title: &str);

    /// Hide the progress indicator.
    fn end_progress(&self);

    /// Bring the output channel into view.
    fn reveal_output(&self, output: &OutputChannel);
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Whether the command exited successfully.
    pub success: bool,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

/// Runs a program to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and capture its output. An `Err` means the
    /// program could not be started at all.
    async fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        tracing::debug!(program, ?args, "running command");
        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Settings as read at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsSnapshot {
    /// The settings to act on.
    pub config: Config,
    /// Problems met while reading them, already worked around.
    pub problems: Vec<String>,
}

impl SettingsSnapshot {
    /// A snapshot read without problems.
    pub fn clean(config: Config) -> Self {
        Self {
            config,
            problems: Vec::new(),
        }
    }
}

/// Read-only access to the current settings.
pub trait SettingsSource: Send + Sync {
    /// A fresh snapshot. Implementations never fail: they work around bad
    /// input and describe it in [`SettingsSnapshot::problems`].
    fn load(&self) -> SettingsSnapshot;
}

/// A fixed settings snapshot.
impl SettingsSource for Config {
    fn load(&self) -> SettingsSnapshot {
        SettingsSnapshot::clean(self.clone())
    }
}

/// A running session as the supervisor sees it.
#[async_trait]
pub trait SessionHandle: Send + Sync {
    /// The session id.
    fn id(&self) -> SessionId;

    /// Fires when the server process goes away.
    fn exit_watch(&self) -> ExitWatch;

    /// Gracefully stop the server and wait for it.
    async fn stop(&mut self) -> Result<(), LspError>;

    /// Push a new value of the configuration section.
    async fn push_configuration(&self, settings: serde_json::Value) -> Result<(), LspError>;

    /// Forward a marker-file change. `Ok(false)` if the path was ignored.
    async fn watched_file_changed(
        &self,
        path: &Path,
        change: FileChangeType,
    ) -> Result<bool, LspError>;

    /// Open a document. `Ok(false)` if the document selector rejected it.
    async fn open_document(&self, path: &Path, text: &str) -> Result<bool, LspError>;
}

#[async_trait]
impl SessionHandle for Session {
    fn id(&self) -> SessionId {
        Session::id(self)
    }

    fn exit_watch(&self) -> ExitWatch {
        Session::exit_watch(self)
    }

    async fn stop(&mut self) -> Result<(), LspError> {
        self.shutdown().await
    }

    async fn push_configuration(&self, settings: serde_json::Value) -> Result<(), LspError> {
        self.did_change_configuration(settings).await
    }

    async fn watched_file_changed(
        &self,
        path: &Path,
        change: FileChangeType,
    ) -> Result<bool, LspError> {
        self.did_change_watched_files(path, change).await
    }

    async fn open_document(&self, path: &Path, text: &str) -> Result<bool, LspError> {
        self.did_open(path, text).await
    }
}

/// Starts sessions.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Spawn the server and complete the handshake.
    async fn launch(
        &self,
        id: SessionId,
        spec: LaunchSpec,
        options: SessionOptions,
    ) -> Result<Box<dyn SessionHandle>, LspError>;
}

/// [`SessionLauncher`] that starts real [`Session`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct LspLauncher;

#[async_trait]
impl SessionLauncher for LspLauncher {
    async fn launch(
        &self,
        id: SessionId,
        spec: LaunchSpec,
        options: SessionOptions,
    ) -> Result<Box<dyn SessionHandle>, LspError> {
        let mut session = Session::new(id, spec, options);
        session.start().await?;
        Ok(Box::new(session))
    }
}
