//! Terminal implementation of the supervisor's [`Host`].
//!
//! Notifications go to stdout. Stdin is read by one task: while a prompt
//! is pending the next line answers it, otherwise lines are forwarded to
//! the command loop.
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};

use mls_core::OutputChannel;
use mls_supervisor::{Host, HostError};

type PendingPrompt = Arc<Mutex<Option<oneshot::Sender<String>>>>;

/// A [`Host`] that talks to the user through the terminal.
#[derive(Debug, Default)]
pub(crate) struct TerminalHost {
    pending: PendingPrompt,
}

impl TerminalHost {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Start reading stdin. Lines that do not answer a prompt are sent on
    /// `lines`; the channel closes at end of input.
    pub(crate) fn spawn_stdin_reader(&self, lines: mpsc::Sender<String>) {
        let pending = self.pending.clone();
        tokio::spawn(async move {
            let mut stdin = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let line = match stdin.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(err) => {
                        tracing::warn!("reading stdin failed: {err}");
                        break;
                    }
                };
                let waiting = lock(&pending).take();
                let unanswered = match waiting {
                    Some(answer) => answer.send(line).err(),
                    None => Some(line),
                };
                if let Some(line) = unanswered {
                    if lines.send(line).await.is_err() {
                        break;
                    }
                }
            }
            lock(&pending).take();
        });
    }

    /// Abandon a pending prompt; its caller sees [`HostError::PromptClosed`].
    pub(crate) fn cancel_prompt(&self) {
        lock(&self.pending).take();
    }
}

fn lock(pending: &PendingPrompt) -> std::sync::MutexGuard<'_, Option<oneshot::Sender<String>>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Map a typed answer onto one of `choices`: either its 1-based number or
/// its text, case-insensitively. Anything else is a dismissal.
pub(crate) fn match_choice(answer: &str, choices: &[&str]) -> Option<String> {
    let answer = answer.trim();
    if let Ok(n) = answer.parse::<usize>() {
        return n
            .checked_sub(1)
            .and_then(|i| choices.get(i))
            .map(|c| c.to_string());
    }
    choices
        .iter()
        .find(|c| c.eq_ignore_ascii_case(answer))
        .map(|c| c.to_string())
}

#[async_trait]
impl Host for TerminalHost {
    fn show_info(&self, message: &str) {
        println!("[info] {message}");
    }

    fn show_error(&self, message: &str) {
        println!("[error] {message}");
    }

    async fn prompt(&self, message: &str, choices: &[&str]) -> Result<Option<String>, HostError> {
        let (tx, rx) = oneshot::channel();
        *lock(&self.pending) = Some(tx);

        let options: Vec<String> = choices
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[{}] {c}", i + 1))
            .collect();
        println!("{message} {}", options.join(" "));

        let answer = rx.await.map_err(|_| HostError::PromptClosed)?;
        Ok(match_choice(&answer, choices))
    }

    fn begin_progress(&self, title: &str) {
        println!("{title}");
    }

    fn end_progress(&self) {
        println!("done.");
    }

    fn reveal_output(&self, output: &OutputChannel) {
        println!("--- {} ---", output.name());
        print!("{}", output.to_display_string());
        println!("---");
    }
}
