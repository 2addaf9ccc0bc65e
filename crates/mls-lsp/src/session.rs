//! A language-server session: one child process and its JSON-RPC connection.
//!
//! Handles the lifecycle (spawn, initialize, shutdown), request/response
//! interchange, settings synchronization and routing of server traffic.
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{timeout, Duration};

use crate::dispatcher::{DispatchResult, Dispatcher};
use crate::error::LspError;
use crate::transport::{
    frame_message, parse_message, read_frame, serialize_notification, serialize_request,
    RequestIds, RpcError,
};
use crate::types::{
    client_capabilities, file_uri, FileChangeType, LaunchSpec, MessageSink, MessageType,
    ServerMessage, SessionId, SessionOptions,
};

/// Bound on the `shutdown` request and on waiting for the child afterwards.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of a single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created but not yet started.
    Created,
    /// Initialize handshake in progress.
    Initializing,
    /// Handshake complete.
    Running,
    /// Shutting down.
    ShuttingDown,
    /// Stopped, either on request or because the process went away.
    Stopped,
}

/// Fires once when the server's output stream closes.
#[derive(Debug)]
pub struct ExitSignal(watch::Sender<bool>);

impl ExitSignal {
    /// Mark the session as exited. Later calls are no-ops.
    pub fn fire(&self) {
        self.0.send_replace(true);
    }
}

/// Observes an [`ExitSignal`].
#[derive(Debug, Clone)]
pub struct ExitWatch(watch::Receiver<bool>);

impl ExitWatch {
    /// A connected signal/watch pair.
    pub fn channel() -> (ExitSignal, ExitWatch) {
        let (tx, rx) = watch::channel(false);
        (ExitSignal(tx), ExitWatch(rx))
    }

    /// Whether the signal has fired.
    pub fn has_exited(&self) -> bool {
        *self.0.borrow()
    }

    /// Wait until the signal fires. Also returns if the signal was dropped.
    pub async fn wait(&mut self) {
        let _ = self.0.wait_for(|exited| *exited).await;
    }
}

/// A session connected to one language-server process.
pub struct Session {
    id: SessionId,
    spec: LaunchSpec,
    options: SessionOptions,
    state: SessionState,
    ids: RequestIds,
    dispatcher: Arc<Mutex<Dispatcher>>,
    settings: Arc<StdMutex<serde_json::Value>>,
    writer_tx: Option<mpsc::Sender<Vec<u8>>>,
    child: Option<Child>,
    exit_signal: Arc<ExitSignal>,
    exit_watch: ExitWatch,
}

impl Session {
    /// Create a session; nothing is spawned until [`Session::start`].
    pub fn new(id: SessionId, spec: LaunchSpec, options: SessionOptions) -> Self {
        let (exit_signal, exit_watch) = ExitWatch::channel();
        let settings = Arc::new(StdMutex::new(options.settings.clone()));
        Self {
            id,
            spec,
            options,
            state: SessionState::Created,
            ids: RequestIds::new(),
            dispatcher: Arc::new(Mutex::new(Dispatcher::new())),
            settings,
            writer_tx: None,
            child: None,
            exit_signal: Arc::new(exit_signal),
            exit_watch,
        }
    }

    /// The session id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// A watch that fires when the server process goes away.
    pub fn exit_watch(&self) -> ExitWatch {
        self.exit_watch.clone()
    }

    /// Spawn the server and perform the handshake.
    ///
    /// On any handshake failure the child is killed before the error is
    /// returned, so a failed start never leaves a process behind.
    pub async fn start(&mut self) -> Result<(), LspError> {
        self.state = SessionState::Initializing;

        let mut child = Command::new(self.spec.executable_path())
            .args(self.spec.arguments())
            .env_clear()
            .envs(self.spec.environment())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                self.state = SessionState::Stopped;
                LspError::SpawnFailed(format!("{}: {}", self.spec.executable_path(), e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LspError::SpawnFailed("could not capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LspError::SpawnFailed("could not capture stdout".into()))?;
        let stderr = child.stderr.take();

        tracing::info!(
            session = %self.id,
            pid = child.id(),
            command = self.spec.executable_path(),
            "server process spawned"
        );

        let (writer_tx, mut writer_rx) = mpsc::channel::<Vec<u8>>(64);
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(msg) = writer_rx.recv().await {
                if stdin.write_all(&msg).await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        self.install_handlers().await;

        let dispatcher = self.dispatcher.clone();
        let reply_tx = writer_tx.clone();
        let exit_signal = self.exit_signal.clone();
        let session = self.id;
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            loop {
                let body = match read_frame(&mut reader).await {
                    Ok(Some(body)) => body,
                    Ok(None) => break,
                    Err(err) => {
                        tracing::warn!(session = %session, "server stream failed: {err}");
                        break;
                    }
                };
                let message = match parse_message(&body) {
                    Ok(m) => m,
                    Err(err) => {
                        tracing::warn!(session = %session, "dropping message: {err}");
                        continue;
                    }
                };
                let reply = dispatcher.lock().await.dispatch(message);
                if let Some(reply) = reply {
                    if reply_tx.send(frame_message(&reply)).await.is_err() {
                        break;
                    }
                }
            }
            dispatcher.lock().await.cancel_all();
            exit_signal.fire();
            tracing::debug!(session = %session, "server output closed");
        });

        if let Some(stderr) = stderr {
            let sink = self.options.message_sink.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    match &sink {
                        Some(sink) => sink(ServerMessage::Stderr(line)),
                        None => tracing::debug!(session = %session, "server stderr: {line}"),
                    }
                }
            });
        }

        self.writer_tx = Some(writer_tx);
        self.child = Some(child);

        if let Err(err) = self.initialize().await {
            self.abort().await;
            return Err(err);
        }

        self.state = SessionState::Running;
        Ok(())
    }

    async fn install_handlers(&self) {
        let section = self.options.sync.configuration_section.clone();
        let settings = self.settings.clone();
        let sink = self.options.message_sink.clone();
        let mut disp = self.dispatcher.lock().await;
        disp.set_request_handler(Box::new(move |method, params| {
            if method == "workspace/configuration" {
                let current = settings
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .clone();
                Ok(configuration_reply(params, &section, &current))
            } else {
                Err(RpcError::method_not_found(method))
            }
        }));
        disp.set_notification_handler(Box::new(move |method, params| {
            match server_message(method, params) {
                Some(message) => deliver(&sink, message),
                None => tracing::trace!("ignoring notification {method}"),
            }
        }));
    }

    async fn initialize(&mut self) -> Result<(), LspError> {
        let params = serde_json::json!({
            "processId": std::process::id(),
            "capabilities": client_capabilities(),
            "rootUri": self.options.root_uri,
            "clientInfo": {
                "name": "mls",
                "version": env!("CARGO_PKG_VERSION")
            }
        });

        let result = self
            .request_within("initialize", params, self.options.handshake_timeout)
            .await
            .map_err(|err| match err {
                LspError::Rpc { code, message } => {
                    LspError::InitFailed(format!("server refused initialize ({code}): {message}"))
                }
                other => other,
            })?;
        if result.get("capabilities").is_none() {
            return Err(LspError::InitFailed(
                "initialize result has no capabilities".into(),
            ));
        }

        self.send_notification("initialized", serde_json::json!({}))
            .await?;
        let current = self.current_settings();
        self.push_settings(current).await
    }

    async fn request_within(
        &self,
        method: &str,
        params: serde_json::Value,
        bound: Duration,
    ) -> Result<serde_json::Value, LspError> {
        let writer_tx = self.writer_tx.as_ref().ok_or(LspError::NotRunning)?;
        if self.exit_watch.has_exited() {
            return Err(LspError::ServerExited);
        }

        let id = self.ids.next();
        let framed = frame_message(&serialize_request(id, method, params));
        let rx = self.dispatcher.lock().await.register_request(id);

        writer_tx
            .send(framed)
            .await
            .map_err(|_| LspError::ServerExited)?;

        let result = timeout(bound, rx)
            .await
            .map_err(|_| LspError::Timeout {
                method: method.to_string(),
                millis: bound.as_millis(),
            })?
            .map_err(|_| LspError::ServerExited)?;

        match result {
            DispatchResult::Success(val) => Ok(val),
            DispatchResult::Error(err) => Err(LspError::Rpc {
                code: err.code,
                message: err.message,
            }),
        }
    }

    /// Send a notification (no response expected).
    pub async fn send_notification(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<(), LspError> {
        let writer_tx = self.writer_tx.as_ref().ok_or(LspError::NotRunning)?;
        writer_tx
            .send(frame_message(&serialize_notification(method, params)))
            .await
            .map_err(|_| LspError::ServerExited)
    }

    fn current_settings(&self) -> serde_json::Value {
        self.settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn push_settings(&self, settings: serde_json::Value) -> Result<(), LspError> {
        let mut section = serde_json::Map::new();
        section.insert(self.options.sync.configuration_section.clone(), settings);
        self.send_notification(
            "workspace/didChangeConfiguration",
            serde_json::json!({ "settings": section }),
        )
        .await
    }

    /// Replace the configuration section and push it to the server.
    pub async fn did_change_configuration(
        &self,
        settings: serde_json::Value,
    ) -> Result<(), LspError> {
        *self
            .settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = settings.clone();
        self.push_settings(settings).await
    }

    /// Forward a change of the watched marker file.
    ///
    /// Returns `false` without sending anything when `path` is not the
    /// marker file.
    pub async fn did_change_watched_files(
        &self,
        path: &Path,
        change: FileChangeType,
    ) -> Result<bool, LspError> {
        let is_marker = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy() == self.options.sync.watch_file);
        if !is_marker {
            return Ok(false);
        }
        let params = serde_json::json!({
            "changes": [{ "uri": file_uri(path), "type": change as i32 }]
        });
        self.send_notification("workspace/didChangeWatchedFiles", params)
            .await?;
        Ok(true)
    }

    /// Send `textDocument/didOpen` if the document selector accepts the file.
    pub async fn did_open(&self, path: &Path, text: &str) -> Result<bool, LspError> {
        let Some(language) = self.options.selector.language_for_path(path) else {
            return Ok(false);
        };
        let params = serde_json::json!({
            "textDocument": {
                "uri": file_uri(path),
                "languageId": language,
                "version": 1,
                "text": text
            }
        });
        self.send_notification("textDocument/didOpen", params).await?;
        Ok(true)
    }

    /// Stop the server: `shutdown`, `exit`, then wait for the process.
    ///
    /// A server that does not cooperate within the shutdown bound is
    /// killed. Stopping an already stopped session is a no-op.
    pub async fn shutdown(&mut self) -> Result<(), LspError> {
        if self.state == SessionState::Stopped {
            return Ok(());
        }
        self.state = SessionState::ShuttingDown;

        if !self.exit_watch.has_exited() {
            if let Err(err) = self
                .request_within("shutdown", serde_json::Value::Null, SHUTDOWN_TIMEOUT)
                .await
            {
                tracing::debug!(session = %self.id, "shutdown request failed: {err}");
            }
            let _ = self
                .send_notification("exit", serde_json::Value::Null)
                .await;
        }

        self.writer_tx = None;

        if let Some(mut child) = self.child.take() {
            match timeout(SHUTDOWN_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::info!(session = %self.id, %status, "server process exited")
                }
                Ok(Err(err)) => tracing::warn!(session = %self.id, "waiting for server: {err}"),
                Err(_) => {
                    tracing::warn!(session = %self.id, "server ignored exit, killing it");
                    let _ = child.kill().await;
                }
            }
        }

        self.exit_signal.fire();
        self.state = SessionState::Stopped;
        Ok(())
    }

    async fn abort(&mut self) {
        self.writer_tx = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
        self.exit_signal.fire();
        self.state = SessionState::Stopped;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("spec", &self.spec)
            .field("state", &self.state)
            .finish()
    }
}

fn deliver(sink: &Option<MessageSink>, message: ServerMessage) {
    match sink {
        Some(sink) => sink(message),
        None => tracing::debug!("server message: {message:?}"),
    }
}

/// Answer a `workspace/configuration` request.
///
/// Items naming the synchronized section (or a dotted path inside it) get
/// the matching part of `settings`; every other item gets `null`.
pub fn configuration_reply(
    params: &serde_json::Value,
    section: &str,
    settings: &serde_json::Value,
) -> serde_json::Value {
    let items = params
        .get("items")
        .and_then(|items| items.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();
    let answers = items
        .iter()
        .map(|item| {
            let requested = item.get("section").and_then(|s| s.as_str()).unwrap_or("");
            if requested == section {
                return settings.clone();
            }
            requested
                .strip_prefix(section)
                .and_then(|rest| rest.strip_prefix('.'))
                .and_then(|path| {
                    let pointer = format!("/{}", path.replace('.', "/"));
                    settings.pointer(&pointer).cloned()
                })
                .unwrap_or(serde_json::Value::Null)
        })
        .collect();
    serde_json::Value::Array(answers)
}

/// Turn a `window/*Message` notification into a [`ServerMessage`].
pub fn server_message(method: &str, params: &serde_json::Value) -> Option<ServerMessage> {
    let kind = MessageType::from_code(params.get("type").and_then(|t| t.as_i64()).unwrap_or(4));
    let text = params.get("message").and_then(|m| m.as_str())?.to_string();
    match method {
        "window/showMessage" => Some(ServerMessage::Show { kind, text }),
        "window/logMessage" => Some(ServerMessage::Log { kind, text }),
        _ => None,
    }
}
