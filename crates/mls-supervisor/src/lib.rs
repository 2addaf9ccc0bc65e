//! mls-supervisor — lifecycle management for the Multi Language Server.
//!
//! Verifies the server's Python dependencies, builds the launch
//! specification from settings, and owns the single live session through
//! start, restart, crash and deactivation.
pub mod commands;
pub mod error;
pub mod host;
pub mod launch;
pub mod supervisor;
pub mod verifier;

pub use commands::{Command, CommandOutcome};
pub use error::{HostError, SupervisorError};
pub use host::{
    CommandOutput, CommandRunner, Host, LspLauncher, SessionHandle, SessionLauncher,
    SettingsSnapshot, SettingsSource, TokioCommandRunner,
};
pub use launch::{
    build_launch_spec, build_launch_spec_with_env, disable_flags, document_selector,
    sync_options, ExtensionLayout,
};
pub use supervisor::{
    Activation, Collaborators, RestartOutcome, Supervisor, SupervisorState, OUTPUT_CHANNEL_NAME,
};
pub use verifier::{DependencyStatus, Verifier, CANCEL_CHOICE, INSTALL_CHOICE};
