//! Checks that the server's Python runtime has `pygls`, and offers to
//! install the requirements when it does not.
use std::fmt;
use std::path::Path;

use mls_core::OutputChannel;

use crate::host::{CommandRunner, Host};

/// Snippet run by the interpreter to probe for the server library.
pub const IMPORT_CHECK: &str = "import pygls; print('success')";

/// Prompt choice that starts the install.
pub const INSTALL_CHOICE: &str = "Install";

/// Prompt choice that declines the install.
pub const CANCEL_CHOICE: &str = "Cancel";

const INSTALL_PROMPT: &str =
    "The language server needs its Python dependencies. Install them now?";
const PROGRESS_TITLE: &str = "Installing Python server dependencies...";

/// Outcome of one verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyStatus {
    /// The library imports.
    Satisfied,
    /// The check itself failed; nothing was installed.
    Missing,
    /// The user accepted the install and it failed.
    InstallFailed,
    /// The user declined or dismissed the install prompt.
    InstallDeclined,
}

impl DependencyStatus {
    /// Whether a session may start.
    pub fn is_satisfied(self) -> bool {
        self == DependencyStatus::Satisfied
    }
}

impl fmt::Display for DependencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DependencyStatus::Satisfied => "satisfied",
            DependencyStatus::Missing => "missing",
            DependencyStatus::InstallFailed => "install failed",
            DependencyStatus::InstallDeclined => "install declined",
        };
        f.write_str(text)
    }
}

/// Runs one verification against an interpreter.
pub struct Verifier<'a> {
    host: &'a dyn Host,
    runner: &'a dyn CommandRunner,
    output: &'a OutputChannel,
    requirements: &'a Path,
}

impl<'a> Verifier<'a> {
    /// `requirements` is the pip requirements file used for the install.
    pub fn new(
        host: &'a dyn Host,
        runner: &'a dyn CommandRunner,
        output: &'a OutputChannel,
        requirements: &'a Path,
    ) -> Self {
        Self {
            host,
            runner,
            output,
            requirements,
        }
    }

    /// Verify `interpreter`, prompting and installing if needed.
    ///
    /// Never fails: every problem ends up as a status, a line in the output
    /// channel and, where the user has to know, one notification.
    pub async fn verify(&self, interpreter: &str) -> DependencyStatus {
        self.output
            .info(format!("Checking server dependencies with {interpreter}"));

        if self.library_present(interpreter).await {
            self.output.info("Server dependencies are installed");
            return DependencyStatus::Satisfied;
        }

        let answer = match self
            .host
            .prompt(INSTALL_PROMPT, &[INSTALL_CHOICE, CANCEL_CHOICE])
            .await
        {
            Ok(answer) => answer,
            Err(err) => {
                let message = format!("Error while checking dependencies: {err}");
                self.output.error(&message);
                self.host.show_error(&message);
                return DependencyStatus::Missing;
            }
        };

        if answer.as_deref() != Some(INSTALL_CHOICE) {
            self.output.warn("Dependency installation declined");
            return DependencyStatus::InstallDeclined;
        }

        self.install(interpreter).await
    }

    async fn library_present(&self, interpreter: &str) -> bool {
        let args = ["-c".to_string(), IMPORT_CHECK.to_string()];
        match self.runner.run(interpreter, &args).await {
            Ok(out) if out.success => true,
            Ok(out) => {
                self.output.warn(format!(
                    "pygls is not importable: {}",
                    last_line(&out.stderr)
                ));
                false
            }
            Err(err) => {
                self.output
                    .warn(format!("Could not run {interpreter}: {err}"));
                false
            }
        }
    }

    async fn install(&self, interpreter: &str) -> DependencyStatus {
        let args = [
            "-m".to_string(),
            "pip".to_string(),
            "install".to_string(),
            "-r".to_string(),
            self.requirements.to_string_lossy().into_owned(),
        ];
        self.output.info(format!(
            "Installing dependencies from {}",
            self.requirements.display()
        ));

        self.host.begin_progress(PROGRESS_TITLE);
        let result = self.runner.run(interpreter, &args).await;
        self.host.end_progress();

        let failure = match result {
            Ok(out) if out.success => {
                self.output.info("Dependencies installed");
                self.host.show_info("Dependencies installed successfully!");
                return DependencyStatus::Satisfied;
            }
            Ok(out) => out.stderr,
            Err(err) => err.to_string(),
        };
        let message = format!("Failed to install dependencies: {}", failure.trim());
        self.output.error(&message);
        self.host.show_error(&message);
        DependencyStatus::InstallFailed
    }
}

fn last_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .unwrap_or("no error output")
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::HostError;
    use crate::host::CommandOutput;

    #[derive(Default)]
    struct ScriptedHost {
        answer: Mutex<Option<Result<Option<String>, HostError>>>,
        events: Mutex<Vec<String>>,
    }

    impl ScriptedHost {
        fn answering(answer: Result<Option<String>, HostError>) -> Self {
            Self {
                answer: Mutex::new(Some(answer)),
                events: Mutex::new(Vec::new()),
            }
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn record(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[async_trait]
    impl Host for ScriptedHost {
        fn show_info(&self, message: &str) {
            self.record(format!("info: {message}"));
        }
        fn show_error(&self, message: &str) {
            self.record(format!("error: {message}"));
        }
        async fn prompt(&self, message: &str, choices: &[&str]) -> Result<Option<String>, HostError> {
            self.record(format!("prompt: {message} {choices:?}"));
            self.answer
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Ok(None))
        }
        fn begin_progress(&self, title: &str) {
            self.record(format!("progress: {title}"));
        }
        fn end_progress(&self) {
            self.record("progress done".into());
        }
        fn reveal_output(&self, _output: &OutputChannel) {}
    }

    #[derive(Default)]
    struct ScriptedRunner {
        results: Mutex<VecDeque<io::Result<CommandOutput>>>,
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl ScriptedRunner {
        fn with(results: Vec<io::Result<CommandOutput>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(CommandOutput::default()))
        }
    }

    fn ok() -> io::Result<CommandOutput> {
        Ok(CommandOutput {
            success: true,
            stdout: "success\n".into(),
            stderr: String::new(),
        })
    }

    fn failed(stderr: &str) -> io::Result<CommandOutput> {
        Ok(CommandOutput {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        })
    }

    fn requirements() -> PathBuf {
        PathBuf::from("/ext/server/requirements.txt")
    }

    #[tokio::test]
    async fn importable_library_is_satisfied_without_prompt() {
        let host = ScriptedHost::default();
        let runner = ScriptedRunner::with(vec![ok()]);
        let output = OutputChannel::new("test");
        let req = requirements();

        let status = Verifier::new(&host, &runner, &output, &req).verify("python3").await;

        assert_eq!(status, DependencyStatus::Satisfied);
        assert!(host.events().is_empty());
        assert_eq!(
            runner.calls(),
            vec![("python3".to_string(), vec!["-c".to_string(), IMPORT_CHECK.to_string()])]
        );
    }

    #[tokio::test]
    async fn declined_prompt_never_installs() {
        let host = ScriptedHost::answering(Ok(Some(CANCEL_CHOICE.into())));
        let runner = ScriptedRunner::with(vec![failed("ModuleNotFoundError: No module named 'pygls'")]);
        let output = OutputChannel::new("test");
        let req = requirements();

        let status = Verifier::new(&host, &runner, &output, &req).verify("python").await;

        assert_eq!(status, DependencyStatus::InstallDeclined);
        assert_eq!(runner.calls().len(), 1);
        assert!(output.contains("No module named 'pygls'"));
        assert!(output.contains("declined"));
    }

    #[tokio::test]
    async fn dismissed_prompt_counts_as_declined() {
        let host = ScriptedHost::answering(Ok(None));
        let runner = ScriptedRunner::with(vec![failed("")]);
        let output = OutputChannel::new("test");
        let req = requirements();

        let status = Verifier::new(&host, &runner, &output, &req).verify("python").await;
        assert_eq!(status, DependencyStatus::InstallDeclined);
    }

    #[tokio::test]
    async fn accepted_install_success() {
        let host = ScriptedHost::answering(Ok(Some(INSTALL_CHOICE.into())));
        let runner = ScriptedRunner::with(vec![failed("no pygls"), ok()]);
        let output = OutputChannel::new("test");
        let req = requirements();

        let status = Verifier::new(&host, &runner, &output, &req).verify("python3").await;

        assert_eq!(status, DependencyStatus::Satisfied);
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[1].1,
            vec!["-m", "pip", "install", "-r", "/ext/server/requirements.txt"]
        );
        let events = host.events();
        assert!(events[1].starts_with("progress:"));
        assert_eq!(events[2], "progress done");
        assert_eq!(events[3], "info: Dependencies installed successfully!");
    }

    #[tokio::test]
    async fn accepted_install_failure_surfaces_stderr() {
        let host = ScriptedHost::answering(Ok(Some(INSTALL_CHOICE.into())));
        let runner = ScriptedRunner::with(vec![
            failed("no pygls"),
            failed("ERROR: Could not find a version that satisfies pygls\n"),
        ]);
        let output = OutputChannel::new("test");
        let req = requirements();

        let status = Verifier::new(&host, &runner, &output, &req).verify("python3").await;

        assert_eq!(status, DependencyStatus::InstallFailed);
        let errors: Vec<_> = host
            .events()
            .into_iter()
            .filter(|e| e.starts_with("error:"))
            .collect();
        assert_eq!(
            errors,
            vec!["error: Failed to install dependencies: ERROR: Could not find a version that satisfies pygls"]
        );
        assert!(output.contains("Failed to install dependencies"));
    }

    #[tokio::test]
    async fn unrunnable_interpreter_still_prompts() {
        let host = ScriptedHost::answering(Ok(Some(CANCEL_CHOICE.into())));
        let runner = ScriptedRunner::with(vec![Err(io::Error::new(
            io::ErrorKind::NotFound,
            "No such file or directory",
        ))]);
        let output = OutputChannel::new("test");
        let req = requirements();

        let status = Verifier::new(&host, &runner, &output, &req).verify("/no/python").await;

        assert_eq!(status, DependencyStatus::InstallDeclined);
        assert!(output.contains("Could not run /no/python"));
    }

    #[tokio::test]
    async fn prompt_failure_is_reported_once_as_missing() {
        let host = ScriptedHost::answering(Err(HostError::PromptClosed));
        let runner = ScriptedRunner::with(vec![failed("")]);
        let output = OutputChannel::new("test");
        let req = requirements();

        let status = Verifier::new(&host, &runner, &output, &req).verify("python").await;

        assert_eq!(status, DependencyStatus::Missing);
        let errors = host
            .events()
            .into_iter()
            .filter(|e| e.starts_with("error:"))
            .count();
        assert_eq!(errors, 1);
    }

    #[test]
    fn status_display_and_predicate() {
        assert!(DependencyStatus::Satisfied.is_satisfied());
        assert!(!DependencyStatus::InstallDeclined.is_satisfied());
        assert_eq!(DependencyStatus::InstallFailed.to_string(), "install failed");
    }

    #[test]
    fn last_line_skips_trailing_blanks() {
        assert_eq!(
            last_line("Traceback:\n  File x\nModuleNotFoundError: pygls\n\n"),
            "ModuleNotFoundError: pygls"
        );
        assert_eq!(last_line(""), "no error output");
    }
}
