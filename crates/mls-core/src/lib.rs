//! mls-core — shared building blocks for the MLS session supervisor.
//!
//! Holds the diagnostics output channel, log-file helpers and the
//! platform directory lookup used by the binary.
pub mod error;
pub mod logging;
pub mod output;
pub mod paths;

pub use error::CoreError;
pub use output::{OutputChannel, OutputLevel, OutputLine};
pub use paths::{DefaultPaths, PlatformPaths};
