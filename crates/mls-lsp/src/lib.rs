//! mls-lsp — the language-server session used by the MLS supervisor.
//!
//! Spawns the server process, speaks `Content-Length` framed JSON-RPC over
//! its stdio, keeps the server's settings in sync and watches the marker
//! file whose changes the server wants to hear about.
pub mod dispatcher;
pub mod error;
pub mod session;
pub mod transport;
pub mod types;
pub mod watcher;

// Re-export key types for convenience.
pub use error::LspError;
pub use session::{ExitSignal, ExitWatch, Session, SessionState};
pub use types::{
    file_uri, DocumentFilter, DocumentSelector, FileChangeType, LaunchSpec, MessageSink,
    MessageType, ServerMessage, SessionId, SessionOptions, SyncOptions, MARKER_FILE_NAME,
    SUPPORTED_LANGUAGES,
};
pub use watcher::{FileWatcher, WatchEvent};
