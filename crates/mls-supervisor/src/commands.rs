//! The externally invokable actions.
use std::fmt;
use std::str::FromStr;

use crate::error::SupervisorError;
use crate::supervisor::{RestartOutcome, Supervisor};

/// A command bound to a supervisor operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Stop the live session and start a fresh one.
    Restart,
    /// Reveal the diagnostics output.
    ShowOutput,
}

/// What a command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Result of a restart.
    Restart(RestartOutcome),
    /// The output was revealed.
    OutputShown,
}

impl Command {
    /// Every command, in registration order.
    pub const ALL: [Command; 2] = [Command::Restart, Command::ShowOutput];

    /// The registered command id.
    pub fn id(self) -> &'static str {
        match self {
            Command::Restart => "multiLanguageServer.restart",
            Command::ShowOutput => "multiLanguageServer.showOutput",
        }
    }

    /// Run the command. Safe to call repeatedly and while another
    /// transition is in flight; restarts queue behind it.
    pub async fn execute(self, supervisor: &Supervisor) -> CommandOutcome {
        tracing::info!(command = self.id(), "executing command");
        match self {
            Command::Restart => CommandOutcome::Restart(supervisor.restart().await),
            Command::ShowOutput => {
                supervisor.show_output();
                CommandOutcome::OutputShown
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Command {
    type Err = SupervisorError;

    /// Accepts the full ids and the short names `restart`, `output`,
    /// `show-output`, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Command::ALL
            .into_iter()
            .find(|cmd| cmd.id().eq_ignore_ascii_case(name))
            .or_else(|| match name.to_ascii_lowercase().as_str() {
                "restart" => Some(Command::Restart),
                "output" | "show-output" | "showoutput" => Some(Command::ShowOutput),
                _ => None,
            })
            .ok_or_else(|| SupervisorError::UnknownCommand(name.to_string()))
    }
}
