//! Error types for the zio handlers
//!
//! This module defines all error types used throughout the crate.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for zio operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the zio handlers
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (missing or malformed settings, missing TLS material)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors from files, standard streams or sockets
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Source-side stream errors (unreadable or unparsable input)
    #[error("Source error: {0}")]
    Source(String),

    /// Sink-side stream errors
    #[error("Sink error: {0}")]
    Sink(String),

    /// Handler-specific error (broker, protocol)
    #[error("Handler error ({handler}): {message}")]
    Handler {
        /// Handler name
        handler: String,
        /// Error message
        message: String,
    },

    /// No handler registered under the requested name
    #[error("Unknown {kind} handler: {name}")]
    UnknownHandler {
        /// "input" or "output"
        kind: &'static str,
        /// Requested handler name
        name: String,
    },

    /// Every receiver of a channel went away while items were still being sent
    #[error("Channel closed by all receivers")]
    ChannelClosed,

    /// Participants did not stop within the shutdown timeout
    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a source error
    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    /// Create a sink error
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    /// Create a handler-specific error
    pub fn handler(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            handler: handler.into(),
            message: message.into(),
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
