//! The diagnostics output channel.
//!
//! An append-only, human-readable log that the user can reveal on demand.
//! Every line is mirrored to `tracing` so the log file carries the same
//! lifecycle history.
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

/// Severity of an output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OutputLevel {
    /// Informational line.
    Info,
    /// Something unexpected that did not stop the supervisor.
    Warning,
    /// A failure the user was told about.
    Error,
}

impl fmt::Display for OutputLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OutputLevel::Info => "INFO",
            OutputLevel::Warning => "WARN",
            OutputLevel::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// One appended line.
#[derive(Debug, Clone)]
pub struct OutputLine {
    level: OutputLevel,
    text: String,
    written_at: SystemTime,
}

impl OutputLine {
    fn new(level: OutputLevel, text: String) -> Self {
        Self {
            level,
            text,
            written_at: SystemTime::now(),
        }
    }

    /// The severity of this line.
    pub fn level(&self) -> OutputLevel {
        self.level
    }

    /// The line text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Wall-clock time the line was appended.
    pub fn written_at(&self) -> SystemTime {
        self.written_at
    }
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.text)
    }
}

/// Shared handle to a named output channel.
///
/// Cloning is cheap; all clones append to the same line list.
#[derive(Debug, Clone)]
pub struct OutputChannel {
    name: Arc<str>,
    lines: Arc<Mutex<Vec<OutputLine>>>,
    max_lines: usize,
}

impl OutputChannel {
    /// Lines retained before the oldest are dropped.
    pub const DEFAULT_MAX_LINES: usize = 10_000;

    /// Create an empty channel with the given display name.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_max_lines(name, Self::DEFAULT_MAX_LINES)
    }

    /// Create an empty channel that keeps at most `max_lines` lines.
    pub fn with_max_lines(name: impl Into<String>, max_lines: usize) -> Self {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            lines: Arc::new(Mutex::new(Vec::new())),
            max_lines: max_lines.max(1),
        }
    }

    /// The channel's display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append an informational line.
    pub fn info(&self, text: impl Into<String>) {
        self.append(OutputLevel::Info, text);
    }

    /// Append a warning line.
    pub fn warn(&self, text: impl Into<String>) {
        self.append(OutputLevel::Warning, text);
    }

    /// Append an error line.
    pub fn error(&self, text: impl Into<String>) {
        self.append(OutputLevel::Error, text);
    }

    /// Append a line at the given level.
    pub fn append(&self, level: OutputLevel, text: impl Into<String>) {
        let text = text.into();
        match level {
            OutputLevel::Info => tracing::info!(channel = %self.name, "{}", text),
            OutputLevel::Warning => tracing::warn!(channel = %self.name, "{}", text),
            OutputLevel::Error => tracing::error!(channel = %self.name, "{}", text),
        }

        let mut lines = self.lock();
        lines.push(OutputLine::new(level, text));
        if lines.len() > self.max_lines {
            let excess = lines.len() - self.max_lines;
            lines.drain(..excess);
        }
    }

    /// Number of lines currently held.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of all lines, oldest first.
    pub fn lines(&self) -> Vec<OutputLine> {
        self.lock().clone()
    }

    /// The most recent line.
    pub fn last(&self) -> Option<OutputLine> {
        self.lock().last().cloned()
    }

    /// Lines at or above `min_level`.
    pub fn at_least(&self, min_level: OutputLevel) -> Vec<OutputLine> {
        self.lock()
            .iter()
            .filter(|line| line.level >= min_level)
            .cloned()
            .collect()
    }

    /// Whether any line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lock().iter().any(|line| line.text.contains(needle))
    }

    /// All lines rendered one per line, as shown to the user.
    pub fn to_display_string(&self) -> String {
        self.lock()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn lock(&self) -> MutexGuard<'_, Vec<OutputLine>> {
        // A panic while appending leaves the vector intact.
        self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_channel_is_empty_and_named() {
        let out = OutputChannel::new("Multi Language Server");
        assert!(out.is_empty());
        assert_eq!(out.len(), 0);
        assert_eq!(out.name(), "Multi Language Server");
        assert!(out.last().is_none());
    }

    #[test]
    fn append_keeps_order_and_level() {
        let out = OutputChannel::new("test");
        out.info("starting");
        out.warn("slow handshake");
        out.error("spawn failed");

        let lines = out.lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].text(), "starting");
        assert_eq!(lines[1].level(), OutputLevel::Warning);
        assert_eq!(lines[2].level(), OutputLevel::Error);
    }

    #[test]
    fn clones_share_lines() {
        let out = OutputChannel::new("test");
        let other = out.clone();
        other.info("from clone");
        assert_eq!(out.len(), 1);
        assert!(out.contains("from clone"));
    }

    #[test]
    fn oldest_lines_are_dropped_at_capacity() {
        let out = OutputChannel::with_max_lines("test", 2);
        out.info("one");
        out.info("two");
        out.info("three");
        let texts: Vec<String> = out.lines().iter().map(|l| l.text().to_string()).collect();
        assert_eq!(texts, vec!["two", "three"]);
    }

    #[test]
    fn at_least_filters_by_level() {
        let out = OutputChannel::new("test");
        out.info("a");
        out.warn("b");
        out.error("c");
        assert_eq!(out.at_least(OutputLevel::Warning).len(), 2);
        assert_eq!(out.at_least(OutputLevel::Error).len(), 1);
        assert_eq!(out.at_least(OutputLevel::Info).len(), 3);
    }

    #[test]
    fn display_string_prefixes_level() {
        let out = OutputChannel::new("test");
        out.info("server started");
        out.error("server crashed");
        assert_eq!(
            out.to_display_string(),
            "[INFO] server started\n[ERROR] server crashed"
        );
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let out = OutputChannel::with_max_lines("test", 0);
        out.info("kept");
        assert_eq!(out.len(), 1);
    }
}
