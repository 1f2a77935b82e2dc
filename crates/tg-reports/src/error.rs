//! Error types for the tg-reports crate.
//!
//! Report entry points never surface these: a failed notification ends in a
//! local log line. They are returned only from construction, configuration
//! and the [`Transport`](crate::transport::Transport) /
//! [`LogSink`](crate::sink::LogSink) seams.

use thiserror::Error;

/// Errors that can occur while building or driving a reporter.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The remote transport rejected or could not deliver a message.
    #[error("transport failed: {reason}")]
    Transport {
        /// The reason the delivery failed.
        reason: String,
    },

    /// The HTTP client failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// An I/O error occurred while opening or writing a log sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The deployment mode label is not one of the known modes.
    #[error("invalid mode: {0}")]
    InvalidMode(String),

    /// The reporter configuration is incomplete or inconsistent.
    #[error("invalid config: {reason}")]
    InvalidConfig {
        /// The reason the configuration is invalid.
        reason: String,
    },
}

impl ReportError {
    /// Creates a transport error from anything printable.
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }
}

/// Result type for reporter operations.
pub type Result<T> = std::result::Result<T, ReportError>;
