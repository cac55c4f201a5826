//! # Error Types
//!
//! Errors that leave a proxy and reach the caller, plus the link-level
//! errors they are built from.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Failures of a single link connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    /// Underlying socket or device I/O failed.
    #[error("Link I/O error: {0}")]
    Io(String),

    /// The connection was closed locally.
    #[error("Link closed")]
    Closed,

    /// A frame could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(String),

    /// No connector handles this endpoint kind.
    #[error("Unsupported endpoint: {0}")]
    UnsupportedEndpoint(String),
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Coarse category callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Validation,
    Transport,
    CountMismatch,
    Lifecycle,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::Validation => "validation",
            Self::Transport => "transport",
            Self::CountMismatch => "count_mismatch",
            Self::Lifecycle => "lifecycle",
        };
        f.write_str(name)
    }
}

/// Caller-facing error of every proxy operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProxyError {
    /// A reply or a liveness signal did not arrive in time.
    #[error("Timed out after {timeout_ms} ms waiting for {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Invalid argument or configuration.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The link or the transfer session failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// An operation kept failing after every retry.
    #[error("{operation} failed after {attempts} attempts")]
    ExhaustedRetries { operation: String, attempts: u32 },

    /// Log index and remote listing disagree on the number of logs.
    #[error("Log index has {index} entries but the listing found {files} files")]
    CountMismatch { index: usize, files: usize },

    /// The proxy has not been started, or was stopped.
    #[error("Proxy '{0}' is not started")]
    NotStarted(String),
}

impl ProxyError {
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Transport(_) | Self::ExhaustedRetries { .. } => ErrorKind::Transport,
            Self::CountMismatch { .. } => ErrorKind::CountMismatch,
            Self::NotStarted(_) => ErrorKind::Lifecycle,
        }
    }
}

impl From<LinkError> for ProxyError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::UnsupportedEndpoint(endpoint) => {
                Self::Validation(format!("unsupported endpoint {endpoint}"))
            }
            other => Self::Transport(other.to_string()),
        }
    }
}
