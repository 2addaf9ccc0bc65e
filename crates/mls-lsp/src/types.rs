//! Types shared between the session and its supervisor.
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Languages the server analyses, in selector order.
pub const SUPPORTED_LANGUAGES: [&str; 3] = ["html", "css", "json"];

/// Name of the marker file whose changes are forwarded to the server.
pub const MARKER_FILE_NAME: &str = ".clientrc";

/// Identifier for one launched session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Wrap a raw id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw id.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Fully resolved description of how to start the server process.
///
/// Built once per start and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    executable_path: String,
    arguments: Vec<String>,
    environment: BTreeMap<String, String>,
}

impl LaunchSpec {
    /// Assemble a spec.
    pub fn new(
        executable_path: impl Into<String>,
        arguments: Vec<String>,
        environment: BTreeMap<String, String>,
    ) -> Self {
        Self {
            executable_path: executable_path.into(),
            arguments,
            environment,
        }
    }

    /// The program to execute.
    pub fn executable_path(&self) -> &str {
        &self.executable_path
    }

    /// Arguments, in order.
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// The complete environment of the child process.
    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }
}

/// One entry of a document selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFilter {
    /// URI scheme, e.g. `file`.
    pub scheme: String,
    /// Language identifier.
    pub language: String,
}

/// Documents the session synchronizes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentSelector {
    filters: Vec<DocumentFilter>,
}

impl DocumentSelector {
    /// A selector for on-disk files of the given languages.
    pub fn for_files(languages: &[&str]) -> Self {
        Self {
            filters: languages
                .iter()
                .map(|language| DocumentFilter {
                    scheme: "file".to_string(),
                    language: (*language).to_string(),
                })
                .collect(),
        }
    }

    /// The filters in order.
    pub fn filters(&self) -> &[DocumentFilter] {
        &self.filters
    }

    /// Whether a document with this scheme and language is synchronized.
    pub fn matches(&self, scheme: &str, language: &str) -> bool {
        self.filters
            .iter()
            .any(|f| f.scheme == scheme && f.language == language)
    }

    /// The language of an on-disk file, if the selector accepts it.
    pub fn language_for_path(&self, path: &Path) -> Option<&str> {
        let language = language_for_extension(path.extension()?.to_str()?)?;
        self.filters
            .iter()
            .find(|f| f.scheme == "file" && f.language == language)
            .map(|f| f.language.as_str())
    }
}

fn language_for_extension(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "html" | "htm" => Some("html"),
        "css" => Some("css"),
        "json" => Some("json"),
        _ => None,
    }
}

/// Settings-synchronization options for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Settings section pushed with `workspace/didChangeConfiguration`.
    pub configuration_section: String,
    /// File name whose changes are forwarded with
    /// `workspace/didChangeWatchedFiles`.
    pub watch_file: String,
}

/// `FileChangeType` from `workspace/didChangeWatchedFiles`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeType {
    /// The file was created.
    Created = 1,
    /// The file was changed.
    Changed = 2,
    /// The file was deleted.
    Deleted = 3,
}

/// Severity carried by `window/showMessage` and `window/logMessage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// An error message.
    Error,
    /// A warning message.
    Warning,
    /// An information message.
    Info,
    /// A log message.
    Log,
}

impl MessageType {
    /// Decode the protocol's numeric type; unknown values read as `Log`.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => MessageType::Error,
            2 => MessageType::Warning,
            3 => MessageType::Info,
            _ => MessageType::Log,
        }
    }
}

/// Something the server wants the user or the output channel to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// `window/showMessage`: meant for the user.
    Show {
        /// Severity.
        kind: MessageType,
        /// Message text.
        text: String,
    },
    /// `window/logMessage`: meant for the output channel.
    Log {
        /// Severity.
        kind: MessageType,
        /// Message text.
        text: String,
    },
    /// A line the server wrote to stderr.
    Stderr(String),
}

/// Receives [`ServerMessage`]s from the session's reader tasks.
pub type MessageSink = Arc<dyn Fn(ServerMessage) + Send + Sync>;

/// Everything besides the [`LaunchSpec`] that a session needs.
#[derive(Clone)]
pub struct SessionOptions {
    /// Documents to synchronize.
    pub selector: DocumentSelector,
    /// Settings synchronization.
    pub sync: SyncOptions,
    /// Bound on the `initialize` request.
    pub handshake_timeout: Duration,
    /// Initial value of the configuration section.
    pub settings: serde_json::Value,
    /// Workspace root, sent as `rootUri`.
    pub root_uri: Option<String>,
    /// Destination for server messages.
    pub message_sink: Option<MessageSink>,
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("selector", &self.selector)
            .field("sync", &self.sync)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("root_uri", &self.root_uri)
            .field("message_sink", &self.message_sink.is_some())
            .finish()
    }
}

/// Client capabilities announced in `initialize`.
pub fn client_capabilities() -> serde_json::Value {
    serde_json::json!({
        "workspace": {
            "configuration": true,
            "didChangeConfiguration": { "dynamicRegistration": false },
            "didChangeWatchedFiles": { "dynamicRegistration": false }
        },
        "textDocument": {
            "synchronization": {
                "dynamicRegistration": false,
                "didSave": true
            },
            "completion": {
                "completionItem": { "snippetSupport": false }
            },
            "publishDiagnostics": { "relatedInformation": false }
        },
        "window": {
            "showMessage": {}
        }
    })
}

/// Convert a path to a `file://` URI, resolving relative paths against the
/// current directory.
pub fn file_uri(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };
    format!("file://{}", absolute.to_string_lossy())
}
