//! Command errors with JSON-RPC style codes.

use serde::{Deserialize, Serialize};
use shared_types::{ErrorKind, ProxyError};
use std::fmt;

/// Error codes carried by [`CommandError`].
pub mod codes {
    pub const UNKNOWN_COMMAND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    pub const UNAVAILABLE: i32 = -32002;
    pub const TIMEOUT: i32 = -32006;
    pub const TRANSPORT: i32 = -32020;
    pub const COUNT_MISMATCH: i32 = -32021;
    pub const NOT_STARTED: i32 = -32022;
}

/// Failure of one gateway command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandError {
    pub code: i32,
    pub message: String,
    /// Error kind of the failed proxy operation, when one failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl CommandError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            kind: None,
        }
    }

    pub fn unknown_command(command: &str) -> Self {
        Self::new(codes::UNKNOWN_COMMAND, format!("Unknown command: {command}"))
    }

    pub fn invalid_params(command: &str, details: impl fmt::Display) -> Self {
        Self::new(
            codes::INVALID_PARAMS,
            format!("Invalid params for {command}: {details}"),
        )
    }

    /// The proxy serving `command` is disabled.
    pub fn unavailable(command: &str, proxy: &str) -> Self {
        Self::new(
            codes::UNAVAILABLE,
            format!("{command} needs {proxy}, which is not enabled"),
        )
    }

    pub fn internal(details: impl Into<String>) -> Self {
        Self::new(
            codes::INTERNAL_ERROR,
            format!("Internal error: {}", details.into()),
        )
    }

    /// Label used for the outcome metric.
    #[must_use]
    pub fn outcome(&self) -> String {
        match self.kind {
            Some(kind) => kind.to_string(),
            None => match self.code {
                codes::UNKNOWN_COMMAND => "unknown".into(),
                codes::INVALID_PARAMS => "invalid_params".into(),
                codes::UNAVAILABLE => "unavailable".into(),
                _ => "internal".into(),
            },
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for CommandError {}

impl From<ProxyError> for CommandError {
    fn from(err: ProxyError) -> Self {
        let kind = err.kind();
        let code = match (&err, kind) {
            (ProxyError::NotStarted(_), _) => codes::NOT_STARTED,
            (_, ErrorKind::Timeout) => codes::TIMEOUT,
            (_, ErrorKind::Validation) => codes::INVALID_PARAMS,
            (_, ErrorKind::CountMismatch) => codes::COUNT_MISMATCH,
            _ => codes::TRANSPORT,
        };
        Self {
            code,
            message: err.to_string(),
            kind: Some(kind),
        }
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(err.to_string())
    }
}
