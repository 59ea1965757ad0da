//! Configuration types for the zio handlers
//!
//! This module defines the global configuration every handler factory is
//! created from, and the knobs the pipeline coordinator reads.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Path sentinel meaning "use the process's standard stream"
pub const STDIO_SENTINEL: &str = "-";

/// Main configuration shared by all handlers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Registered name of the input handler (e.g. "file", "amqp")
    #[serde(default = "default_handler")]
    pub input_handler: String,

    /// Registered name of the output handler
    #[serde(default = "default_handler")]
    pub output_handler: String,

    /// Input file for the file source; empty or "-" reads standard input
    #[serde(default = "default_stdio_path")]
    pub input_file_path: String,

    /// Output file for the file sink; empty or "-" writes standard output
    #[serde(default = "default_stdio_path")]
    pub output_file_path: String,

    /// Handler-specific configuration file (required by the queue source)
    #[serde(default)]
    pub input_handler_config: Option<PathBuf>,

    /// How the input stream is interpreted
    #[serde(default)]
    pub input_mode: InputMode,

    /// Capacity of the work and result channels
    ///
    /// `None` makes both channels unbounded.
    #[serde(default)]
    pub channel_capacity: Option<usize>,

    /// Number of processor tasks between source and sinks
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Time participants get to stop once the pipeline is cancelled (in seconds)
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// What the coordinator does when a participant fails
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl GlobalConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            input_handler: default_handler(),
            output_handler: default_handler(),
            input_file_path: default_stdio_path(),
            output_file_path: default_stdio_path(),
            input_handler_config: None,
            input_mode: InputMode::default(),
            channel_capacity: None,
            workers: default_workers(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            failure_policy: FailurePolicy::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.input_handler.is_empty() {
            return Err(crate::Error::config("Input handler name cannot be empty"));
        }
        if self.output_handler.is_empty() {
            return Err(crate::Error::config("Output handler name cannot be empty"));
        }
        if self.workers == 0 {
            return Err(crate::Error::config("Worker count must be > 0"));
        }
        if self.channel_capacity == Some(0) {
            return Err(crate::Error::config(
                "Channel capacity must be > 0 (omit it for an unbounded channel)",
            ));
        }
        if self.shutdown_timeout_secs == 0 {
            return Err(crate::Error::config("Shutdown timeout must be > 0"));
        }
        if let Some(path) = &self.input_handler_config
            && path.as_os_str().is_empty()
        {
            return Err(crate::Error::config(
                "Input handler config path cannot be empty when set",
            ));
        }

        Ok(())
    }

    /// Shutdown timeout as a `Duration`
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `path` selects a standard stream instead of a file
pub fn is_stdio(path: &str) -> bool {
    path.is_empty() || path == STDIO_SENTINEL
}

/// Interpretation of the input stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// One domain name per line
    #[default]
    Lines,
    /// DNS zone-file syntax, one work item per record
    ZoneFile,
}

/// Coordinator reaction to a failing participant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Cancel every other participant immediately
    #[default]
    Abort,
    /// Let the remaining participants drain what is already queued
    Drain,
}

impl std::str::FromStr for FailurePolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "drain" => Ok(FailurePolicy::Drain),
            other => Err(crate::Error::config(format!(
                "Unknown failure policy '{}'. Valid policies: abort, drain",
                other
            ))),
        }
    }
}

fn default_handler() -> String {
    "file".to_string()
}

fn default_stdio_path() -> String {
    STDIO_SENTINEL.to_string()
}

fn default_workers() -> usize {
    1
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}
