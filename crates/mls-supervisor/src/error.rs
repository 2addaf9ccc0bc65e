//! Supervisor error types.
use mls_lsp::LspError;

/// Errors raised by the hosting environment.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The user surface closed before an answer arrived.
    #[error("prompt closed without an answer")]
    PromptClosed,

    /// The host cannot show prompts at all.
    #[error("host cannot prompt: {0}")]
    Unavailable(String),

    /// I/O error while talking to the user.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from supervisor operations that talk to a live session.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The session rejected or failed a message.
    #[error("session error: {0}")]
    Session(#[from] LspError),

    /// A host surface failed.
    #[error("host error: {0}")]
    Host(#[from] HostError),

    /// A command name that is not recognised.
    #[error("unknown command: {0}")]
    UnknownCommand(String),
}
