//! The session supervisor: owns the lifecycle state and the single live
//! session.
//!
//! Every state-dependent operation runs under one operation lock held
//! across its suspension points, so transitions never interleave: a
//! restart issued during a restart waits for it, and deactivation waits
//! for an in-flight start. The observable [`SupervisorState`] can be read
//! at any time without the lock.
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use mls_config::{resolve, Config, Settings};
use mls_core::{OutputChannel, OutputLevel};
use mls_lsp::{
    file_uri, ExitWatch, FileChangeType, MessageSink, MessageType, ServerMessage, SessionId,
    SessionOptions,
};
use tokio::sync::Mutex;

use crate::error::SupervisorError;
use crate::host::{CommandRunner, Host, SessionHandle, SessionLauncher, SettingsSource};
use crate::launch::{build_launch_spec, document_selector, sync_options, ExtensionLayout};
use crate::verifier::{DependencyStatus, Verifier};

/// Name of the diagnostics output channel.
pub const OUTPUT_CHANNEL_NAME: &str = "Multi Language Server";

const ACTIVATION_ABORTED: &str =
    "The extension cannot be activated without the required dependencies.";
const ACTIVATED: &str = "Multi Language Server activated!";

/// Lifecycle of the supervised session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// No session. Initial and terminal state.
    Inactive,
    /// A session is being launched.
    Starting,
    /// A session is live.
    Active,
    /// The live session is being stopped.
    Stopping,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SupervisorState::Inactive => "inactive",
            SupervisorState::Starting => "starting",
            SupervisorState::Active => "active",
            SupervisorState::Stopping => "stopping",
        };
        f.write_str(text)
    }
}

/// Result of [`Supervisor::activate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// `enable = false`; nothing was verified or started.
    Disabled,
    /// A session was already live.
    AlreadyActive,
    /// Verification did not succeed; no session was started.
    DependenciesUnavailable(DependencyStatus),
    /// A session is live.
    Started,
    /// The session could not be started.
    StartFailed,
}

/// Result of [`Supervisor::restart`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    /// No session existed; nothing happened.
    NotActive,
    /// The old session was stopped and a new one is live.
    Restarted,
    /// The settings now disable the server; the old session was stopped.
    Disabled,
    /// The new session could not be started.
    Failed,
}

/// The collaborators a supervisor talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// User-facing surface.
    pub host: Arc<dyn Host>,
    /// Starts sessions.
    pub launcher: Arc<dyn SessionLauncher>,
    /// Runs the dependency check and install.
    pub runner: Arc<dyn CommandRunner>,
    /// Settings snapshots.
    pub settings: Arc<dyn SettingsSource>,
}

struct LiveSession {
    generation: u64,
    handle: Box<dyn SessionHandle>,
}

#[derive(Default)]
struct Slot {
    session: Option<LiveSession>,
    next_generation: u64,
    crashed: bool,
}

struct Shared {
    collaborators: Collaborators,
    layout: ExtensionLayout,
    workspace_root: Option<PathBuf>,
    output: OutputChannel,
    state: StdMutex<SupervisorState>,
    reported_problems: StdMutex<Vec<String>>,
    slot: Mutex<Slot>,
}

/// Owns the lifecycle of at most one language-server session.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Supervisor {
    shared: Arc<Shared>,
}

impl Supervisor {
    /// Create an inactive supervisor.
    pub fn new(
        collaborators: Collaborators,
        layout: ExtensionLayout,
        workspace_root: Option<PathBuf>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                collaborators,
                layout,
                workspace_root,
                output: OutputChannel::new(OUTPUT_CHANNEL_NAME),
                state: StdMutex::new(SupervisorState::Inactive),
                reported_problems: StdMutex::new(Vec::new()),
                slot: Mutex::new(Slot::default()),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SupervisorState {
        *self
            .shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The diagnostics output channel.
    pub fn output(&self) -> &OutputChannel {
        &self.shared.output
    }

    /// Id of the live session, waiting for any in-flight transition.
    pub async fn session_id(&self) -> Option<SessionId> {
        let slot = self.shared.slot.lock().await;
        slot.session.as_ref().map(|live| live.handle.id())
    }

    fn set_state(&self, state: SupervisorState) {
        let mut current = self
            .shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *current != state {
            tracing::debug!(from = %*current, to = %state, "supervisor transition");
            *current = state;
        }
    }

    fn host(&self) -> &dyn Host {
        self.shared.collaborators.host.as_ref()
    }

    fn snapshot(&self) -> (Config, Settings) {
        let snapshot = self.shared.collaborators.settings.load();
        self.report_settings_problems(&snapshot.problems);
        let settings = resolve(&snapshot.config);
        (snapshot.config, settings)
    }

    /// Surface settings problems once; the same set is not repeated on
    /// later snapshots.
    fn report_settings_problems(&self, problems: &[String]) {
        let mut reported = self
            .shared
            .reported_problems
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if reported.as_slice() == problems {
            return;
        }
        *reported = problems.to_vec();
        if problems.is_empty() {
            return;
        }
        for problem in problems {
            self.shared.output.error(problem);
        }
        self.host().show_error(&problems.join("\n"));
    }

    /// Activation entry point: verify dependencies and start the session.
    pub async fn activate(&self) -> Activation {
        let mut slot = self.shared.slot.lock().await;
        let output = &self.shared.output;
        output.info("Initializing Multi Language Server...");

        if slot.session.is_some() {
            output.info("Language server is already running");
            return Activation::AlreadyActive;
        }

        let (config, settings) = self.snapshot();
        if !settings.enabled {
            output.info("Language server is disabled in settings");
            return Activation::Disabled;
        }

        let requirements = self.shared.layout.requirements();
        let status = Verifier::new(
            self.host(),
            self.shared.collaborators.runner.as_ref(),
            output,
            &requirements,
        )
        .verify(&settings.interpreter)
        .await;

        if !status.is_satisfied() {
            if status == DependencyStatus::InstallDeclined {
                output.error(ACTIVATION_ABORTED);
                self.host().show_error(ACTIVATION_ABORTED);
            } else {
                output.error(format!("Activation aborted: dependencies {status}"));
            }
            return Activation::DependenciesUnavailable(status);
        }

        if self.start_locked(&mut slot, &config, &settings).await {
            Activation::Started
        } else {
            Activation::StartFailed
        }
    }

    async fn start_locked(&self, slot: &mut Slot, config: &Config, settings: &Settings) -> bool {
        let output = &self.shared.output;
        self.set_state(SupervisorState::Starting);

        let spec = build_launch_spec(settings, &self.shared.layout);
        output.info(format!("Using Python interpreter: {}", spec.executable_path()));

        slot.next_generation += 1;
        let generation = slot.next_generation;
        let options = SessionOptions {
            selector: document_selector(),
            sync: sync_options(),
            handshake_timeout: settings.handshake_timeout,
            settings: config.section_value(),
            root_uri: self.shared.workspace_root.as_deref().map(file_uri),
            message_sink: Some(self.message_sink()),
        };

        match self
            .shared
            .collaborators
            .launcher
            .launch(SessionId::new(generation), spec, options)
            .await
        {
            Ok(handle) => {
                let exit = handle.exit_watch();
                output.info(format!("Language server started ({})", handle.id()));
                slot.session = Some(LiveSession { generation, handle });
                slot.crashed = false;
                self.spawn_exit_monitor(generation, exit);
                self.set_state(SupervisorState::Active);
                if settings.toggles.notifications_enabled {
                    self.host().show_info(ACTIVATED);
                }
                true
            }
            Err(err) => {
                self.set_state(SupervisorState::Inactive);
                let message = format!("Failed to start the language server: {err}");
                output.error(&message);
                self.host().show_error(&message);
                false
            }
        }
    }

    fn spawn_exit_monitor(&self, generation: u64, mut exit: ExitWatch) {
        let supervisor = self.clone();
        tokio::spawn(async move {
            exit.wait().await;
            supervisor.session_exited(generation).await;
        });
    }

    /// Called when the server of `generation` went away. Stale
    /// generations (already stopped or replaced) are ignored.
    async fn session_exited(&self, generation: u64) {
        let mut slot = self.shared.slot.lock().await;
        if !matches!(&slot.session, Some(live) if live.generation == generation) {
            return;
        }
        slot.session = None;
        slot.crashed = true;
        self.set_state(SupervisorState::Inactive);

        let message = "The language server exited unexpectedly. Use restart to start it again.";
        self.shared.output.error(message);
        self.host().show_error(message);
    }

    /// Stop `live`. The state stays `Stopping`; the caller decides what
    /// follows.
    async fn stop_session(&self, live: LiveSession) {
        self.set_state(SupervisorState::Stopping);
        let mut handle = live.handle;
        let id = handle.id();
        if let Err(err) = handle.stop().await {
            self.shared
                .output
                .warn(format!("Error while stopping the language server: {err}"));
        }
        self.shared
            .output
            .info(format!("Language server stopped ({id})"));
    }

    /// Stop the live session and start a fresh one from current settings.
    ///
    /// Without a live session this only writes a log line, unless the last
    /// session crashed, in which case a new one is started.
    pub async fn restart(&self) -> RestartOutcome {
        let mut slot = self.shared.slot.lock().await;
        let output = &self.shared.output;

        match slot.session.take() {
            Some(live) => {
                self.stop_session(live).await;
                output.info("Server stopped, restarting...");
            }
            None if slot.crashed => output.info("Restarting the language server after it exited..."),
            None => {
                output.info("Restart requested but the language server is not running");
                return RestartOutcome::NotActive;
            }
        }

        let (config, settings) = self.snapshot();
        if !settings.enabled {
            slot.crashed = false;
            self.set_state(SupervisorState::Inactive);
            output.info("Language server is disabled in settings; not restarting");
            return RestartOutcome::Disabled;
        }

        if self.start_locked(&mut slot, &config, &settings).await {
            RestartOutcome::Restarted
        } else {
            RestartOutcome::Failed
        }
    }

    /// Stop the live session, if any, and wait until it is gone.
    pub async fn deactivate(&self) {
        let mut slot = self.shared.slot.lock().await;
        slot.crashed = false;
        match slot.session.take() {
            Some(live) => self.stop_session(live).await,
            None => tracing::debug!("deactivate with no live session"),
        }
        self.set_state(SupervisorState::Inactive);
    }

    /// Reveal the diagnostics output.
    pub fn show_output(&self) {
        self.host().reveal_output(&self.shared.output);
    }

    /// Push the current settings section to the live session.
    ///
    /// Returns `Ok(false)` when no session is live.
    pub async fn configuration_changed(&self) -> Result<bool, SupervisorError> {
        let slot = self.shared.slot.lock().await;
        let Some(live) = slot.session.as_ref() else {
            return Ok(false);
        };
        let (config, _) = self.snapshot();
        live.handle.push_configuration(config.section_value()).await?;
        self.shared.output.info("Configuration change sent to the server");
        Ok(true)
    }

    /// Forward a marker-file change to the live session.
    pub async fn watched_file_changed(
        &self,
        path: &Path,
        change: FileChangeType,
    ) -> Result<bool, SupervisorError> {
        let slot = self.shared.slot.lock().await;
        match slot.session.as_ref() {
            Some(live) => Ok(live.handle.watched_file_changed(path, change).await?),
            None => Ok(false),
        }
    }

    /// Open a document in the live session if its language is supported.
    pub async fn open_document(&self, path: &Path, text: &str) -> Result<bool, SupervisorError> {
        let slot = self.shared.slot.lock().await;
        let Some(live) = slot.session.as_ref() else {
            return Ok(false);
        };
        let opened = live.handle.open_document(path, text).await?;
        if !opened {
            tracing::debug!(path = %path.display(), "document not handled by the server");
        }
        Ok(opened)
    }

    fn message_sink(&self) -> MessageSink {
        let output = self.shared.output.clone();
        let host = self.shared.collaborators.host.clone();
        Arc::new(move |message: ServerMessage| match message {
            ServerMessage::Show { kind, text } => {
                output.append(output_level(kind), &text);
                match kind {
                    MessageType::Error => host.show_error(&text),
                    _ => host.show_info(&text),
                }
            }
            ServerMessage::Log { kind, text } => output.append(output_level(kind), text),
            ServerMessage::Stderr(line) => output.append(OutputLevel::Info, line),
        })
    }
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("state", &self.state())
            .field("layout", &self.shared.layout)
            .field("workspace_root", &self.shared.workspace_root)
            .finish_non_exhaustive()
    }
}

fn output_level(kind: MessageType) -> OutputLevel {
    match kind {
        MessageType::Error => OutputLevel::Error,
        MessageType::Warning => OutputLevel::Warning,
        MessageType::Info | MessageType::Log => OutputLevel::Info,
    }
}
