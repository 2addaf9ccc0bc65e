//! Session error types.
/// Errors from the language-server session.
#[derive(Debug, thiserror::Error)]
pub enum LspError {
    /// The server process could not be launched.
    #[error("server failed to start: {0}")]
    SpawnFailed(String),

    /// The `initialize` handshake failed.
    #[error("server initialization failed: {0}")]
    InitFailed(String),

    /// JSON-RPC error returned by the server.
    #[error("JSON-RPC error {code}: {message}")]
    Rpc {
        /// The error code.
        code: i32,
        /// The error message.
        message: String,
    },

    /// A request got no answer in time.
    #[error("{method} timed out after {millis} ms")]
    Timeout {
        /// The request method.
        method: String,
        /// The bound that was exceeded.
        millis: u128,
    },

    /// The server process is gone.
    #[error("server process exited")]
    ServerExited,

    /// The session is not in a state that accepts messages.
    #[error("session is not running")]
    NotRunning,

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A frame or message did not follow the protocol.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The file watcher could not be set up.
    #[error("watch error: {0}")]
    Watch(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<notify::Error> for LspError {
    fn from(err: notify::Error) -> Self {
        LspError::Watch(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_failed_display() {
        let err = LspError::SpawnFailed("python3: not found".into());
        assert_eq!(err.to_string(), "server failed to start: python3: not found");
    }

    #[test]
    fn init_failed_display() {
        let err = LspError::InitFailed("no capabilities".into());
        assert_eq!(
            err.to_string(),
            "server initialization failed: no capabilities"
        );
    }

    #[test]
    fn rpc_display() {
        let err = LspError::Rpc {
            code: -32601,
            message: "method not found".into(),
        };
        assert_eq!(err.to_string(), "JSON-RPC error -32601: method not found");
    }

    #[test]
    fn timeout_display_names_method() {
        let err = LspError::Timeout {
            method: "initialize".into(),
            millis: 1500,
        };
        assert_eq!(err.to_string(), "initialize timed out after 1500 ms");
    }

    #[test]
    fn exited_and_not_running_display() {
        assert_eq!(LspError::ServerExited.to_string(), "server process exited");
        assert_eq!(LspError::NotRunning.to_string(), "session is not running");
    }

    #[test]
    fn io_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = LspError::from(io);
        assert!(err.to_string().contains("pipe closed"));
    }

    #[test]
    fn watch_error_display() {
        let err = LspError::Watch("inotify limit reached".into());
        assert_eq!(err.to_string(), "watch error: inotify limit reached");
    }
}
