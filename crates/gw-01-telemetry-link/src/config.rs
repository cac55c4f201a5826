//! # Telemetry Link Configuration

use serde::{Deserialize, Serialize};
use shared_bus::BridgeConfig;
use shared_types::{LinkEndpoint, ProxyError, DEFAULT_BAUD};
use std::time::Duration;

/// Telemetry link configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryLinkConfig {
    /// Endpoint string, e.g. `udp:0.0.0.0:14551`.
    pub endpoint: String,

    /// Serial line speed.
    pub baud: u32,

    /// Per-key mailbox capacity.
    pub maxlen: usize,

    /// Link debug verbosity. Above 0, every transmitted message is traced.
    pub debug: u8,

    /// How long one heartbeat wait lasts.
    pub heartbeat_timeout_ms: u64,

    /// Number of heartbeat waits before `start` gives up. `None` retries
    /// forever.
    pub heartbeat_attempts: Option<u32>,

    /// Sleep between I/O loop iterations.
    pub loop_interval_ms: u64,

    /// Upper bound for each wait inside stop.
    pub stop_timeout_ms: u64,

    /// Default wait used by request/reply helpers.
    pub reply_timeout_ms: u64,
}

impl Default for TelemetryLinkConfig {
    fn default() -> Self {
        Self {
            endpoint: "udp:127.0.0.1:14551".to_string(),
            baud: DEFAULT_BAUD,
            maxlen: 200,
            debug: 0,
            heartbeat_timeout_ms: 5_000,
            heartbeat_attempts: None,
            loop_interval_ms: 10,
            stop_timeout_ms: 5_000,
            reply_timeout_ms: 3_000,
        }
    }
}

impl TelemetryLinkConfig {
    /// Create a config for testing (short waits, bounded start).
    pub fn for_testing() -> Self {
        Self {
            endpoint: "sim:test".to_string(),
            baud: DEFAULT_BAUD,
            maxlen: 200,
            debug: 0,
            heartbeat_timeout_ms: 100,
            heartbeat_attempts: Some(2),
            loop_interval_ms: 1,
            stop_timeout_ms: 1_000,
            reply_timeout_ms: 500,
        }
    }

    /// Parse and check the endpoint string.
    pub fn parse_endpoint(&self) -> Result<LinkEndpoint, ProxyError> {
        LinkEndpoint::parse(&self.endpoint, self.baud)
    }

    #[must_use]
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            mailbox_capacity: self.maxlen,
            loop_interval_ms: self.loop_interval_ms,
            stop_timeout_ms: self.stop_timeout_ms,
        }
    }

    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    #[must_use]
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryLinkConfig::default();
        assert_eq!(config.maxlen, 200);
        assert_eq!(config.heartbeat_attempts, None);
        assert_eq!(config.bridge_config().loop_interval_ms, 10);
        assert!(config.parse_endpoint().is_ok());
    }

    #[test]
    fn test_testing_config_is_bounded() {
        let config = TelemetryLinkConfig::for_testing();
        assert!(config.heartbeat_attempts.is_some());
        assert_eq!(config.parse_endpoint().unwrap(), LinkEndpoint::sim("test"));
    }
}
