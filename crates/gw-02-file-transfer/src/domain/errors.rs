//! # Transfer Errors

use shared_types::{LinkError, ProxyError};
use thiserror::Error;

/// Failures reported by a transfer session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    /// The vehicle refused the operation with a protocol return code.
    #[error("{operation} failed: {code}")]
    Nack { operation: String, code: u8 },

    /// Local filesystem error.
    #[error("I/O error: {0}")]
    Io(String),

    /// The link carrying the session failed.
    #[error(transparent)]
    Link(#[from] LinkError),
}

impl From<std::io::Error> for TransferError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<TransferError> for ProxyError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Link(link) => link.into(),
            other => ProxyError::Transport(other.to_string()),
        }
    }
}
