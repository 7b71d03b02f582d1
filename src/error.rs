//! Error types for Replay Zero

use std::io;
use thiserror::Error;

/// Result type for Replay Zero operations
pub type Result<T> = std::result::Result<T, ReplayError>;

/// Errors that can occur while capturing and dispatching events
#[derive(Debug, Error)]
pub enum ReplayError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Request/response pair could not be turned into an event
    #[error("Could not convert request and response: {0}")]
    Conversion(String),

    /// Malformed serialized event or control value
    #[error("Parse error: {0}")]
    Parse(String),

    /// Template failed to parse or execute
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// A sink refused or failed to store a blob
    #[error("Sink error for {target}: {reason}")]
    Sink {
        /// Stream or file the blob was addressed to
        target: String,
        /// What went wrong
        reason: String,
    },

    /// Blob exceeds the transport's record ceiling
    #[error("Data too large: {size} bytes exceeds limit of {limit} bytes")]
    DataTooLarge {
        /// Actual size
        size: usize,
        /// Size limit
        limit: usize,
    },

    /// Frame size limit must be positive
    #[error("Invalid frame limit: {0}")]
    InvalidFrameLimit(usize),

    /// Output file name would escape the output directory
    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for ReplayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
