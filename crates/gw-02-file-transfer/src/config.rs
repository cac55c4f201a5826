//! # File Transfer Configuration

use crate::domain::DEFAULT_SIZE_TOLERANCE;
use crate::ports::TransferSettings;
use serde::{Deserialize, Serialize};
use shared_types::{msg_ids, LinkEndpoint, ProxyError, DEFAULT_BAUD};
use std::time::Duration;

/// File-transfer proxy configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTransferConfig {
    /// Endpoint string of the dedicated transfer link.
    pub endpoint: String,

    /// Serial line speed.
    pub baud: u32,

    /// Protocol debug verbosity passed to the session.
    pub debug: u8,

    /// Directory holding one subdirectory per day of logs.
    pub log_base_path: String,

    /// File-name suffix of log files.
    pub log_suffix: String,

    /// Directory scanned by `clear_error_logs` when no path is given.
    pub error_log_path: String,

    /// Largest size difference (bytes) still considered a match.
    pub size_tolerance_bytes: u64,

    /// Attempts per directory listing before giving up.
    pub ls_retries: u32,

    /// Pause between listing attempts.
    pub ls_retry_delay_ms: u64,

    /// Wait for the vehicle heartbeat on connect.
    pub heartbeat_timeout_ms: u64,

    /// Wait for the log index after requesting it.
    pub index_timeout_ms: u64,

    /// Wait for the clock reply.
    pub clock_timeout_ms: u64,

    /// Message id requested for the clock reading.
    pub clock_message_id: u32,

    /// Session retry period.
    pub retry_time_ms: u64,

    /// Session burst read size in bytes.
    pub burst_read_size: u16,

    /// Worker threads executing blocking calls. Operations are serialized
    /// when this is 1.
    pub workers: usize,
}

impl Default for FileTransferConfig {
    fn default() -> Self {
        Self {
            endpoint: "udp:127.0.0.1:14551".to_string(),
            baud: DEFAULT_BAUD,
            debug: 0,
            log_base_path: "fs/microsd/log".to_string(),
            log_suffix: ".log".to_string(),
            error_log_path: "fs/microsd".to_string(),
            size_tolerance_bytes: DEFAULT_SIZE_TOLERANCE,
            ls_retries: 5,
            ls_retry_delay_ms: 2_000,
            heartbeat_timeout_ms: 5_000,
            index_timeout_ms: 5_000,
            clock_timeout_ms: 3_000,
            clock_message_id: msg_ids::AUTOPILOT_VERSION,
            retry_time_ms: 200,
            burst_read_size: 239,
            workers: 1,
        }
    }
}

impl FileTransferConfig {
    /// Create a config for testing (short waits, simulated endpoint).
    pub fn for_testing() -> Self {
        Self {
            endpoint: "sim:test".to_string(),
            ls_retries: 3,
            ls_retry_delay_ms: 5,
            heartbeat_timeout_ms: 200,
            index_timeout_ms: 500,
            clock_timeout_ms: 200,
            ..Self::default()
        }
    }

    /// Check the endpoint and numeric limits.
    pub fn validate(&self) -> Result<LinkEndpoint, ProxyError> {
        if self.workers == 0 {
            return Err(ProxyError::Validation("workers must be at least 1".into()));
        }
        if self.ls_retries == 0 {
            return Err(ProxyError::Validation("ls_retries must be at least 1".into()));
        }
        if self.log_base_path.trim_matches('/').is_empty() {
            return Err(ProxyError::Validation("log_base_path is empty".into()));
        }
        LinkEndpoint::parse(&self.endpoint, self.baud)
    }

    #[must_use]
    pub fn settings(&self) -> TransferSettings {
        TransferSettings {
            debug: self.debug,
            retry_time_ms: self.retry_time_ms,
            burst_read_size: self.burst_read_size,
        }
    }

    #[must_use]
    pub fn ls_retry_delay(&self) -> Duration {
        Duration::from_millis(self.ls_retry_delay_ms)
    }

    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    #[must_use]
    pub fn index_timeout(&self) -> Duration {
        Duration::from_millis(self.index_timeout_ms)
    }

    #[must_use]
    pub fn clock_timeout(&self) -> Duration {
        Duration::from_millis(self.clock_timeout_ms)
    }
}
