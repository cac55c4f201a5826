//! # Gateway Configuration
//!
//! One config for the whole process: the telemetry link, the file-transfer
//! link, which of them to run, and how often statistics are exported.
//! Defaults are overridden from `GW_*` environment variables.

use gateway_telemetry::parse_flag;
use gw_01_telemetry_link::TelemetryLinkConfig;
use gw_02_file_transfer::FileTransferConfig;
use serde::{Deserialize, Serialize};
use shared_types::{EndpointKind, ProxyError};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Endpoint used when nothing is configured: the in-process vehicle.
pub const DEFAULT_SIM_ENDPOINT: &str = "sim:vehicle";

/// Complete gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub telemetry: TelemetryLinkConfig,
    pub transfer: FileTransferConfig,
    pub enable_telemetry: bool,
    pub enable_transfer: bool,
    /// Period of the metrics export task.
    pub stats_interval_ms: u64,
    /// Heartbeat period of the simulated vehicle, when one is used.
    pub sim_heartbeat_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            telemetry: TelemetryLinkConfig {
                endpoint: DEFAULT_SIM_ENDPOINT.to_string(),
                ..TelemetryLinkConfig::default()
            },
            transfer: FileTransferConfig {
                endpoint: DEFAULT_SIM_ENDPOINT.to_string(),
                ..FileTransferConfig::default()
            },
            enable_telemetry: true,
            enable_transfer: true,
            stats_interval_ms: 5_000,
            sim_heartbeat_ms: 1_000,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable holds a value that cannot be parsed.
    #[error("{var}={value:?} is invalid: {reason}")]
    InvalidValue {
        var: String,
        value: String,
        reason: String,
    },

    /// A component rejected its part of the configuration.
    #[error("{component}: {source}")]
    Component {
        component: &'static str,
        #[source]
        source: ProxyError,
    },

    /// File transfer needs a session implementation for the endpoint kind.
    #[error("file transfer is not available over {0} endpoints")]
    UnsupportedTransfer(String),

    /// The telemetry link has no connector for the endpoint kind.
    #[error("telemetry link is not available over {0} endpoints")]
    UnsupportedTelemetry(String),
}

impl GatewayConfig {
    /// Load configuration from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `GW_TELEMETRY_ENDPOINT`, `GW_TRANSFER_ENDPOINT`: endpoint strings
    /// - `GW_BAUD`: serial speed for both links
    /// - `GW_MAXLEN`: telemetry mailbox capacity
    /// - `GW_DEBUG`: protocol debug verbosity for both links
    /// - `GW_ENABLE_TELEMETRY`, `GW_ENABLE_TRANSFER`: feature switches
    /// - `GW_LOG_BASE_PATH`: remote log directory
    /// - `GW_STATS_INTERVAL_MS`: metrics export period
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(endpoint) = lookup("GW_TELEMETRY_ENDPOINT") {
            config.telemetry.endpoint = endpoint;
        }
        if let Some(endpoint) = lookup("GW_TRANSFER_ENDPOINT") {
            config.transfer.endpoint = endpoint;
        }
        if let Some(baud) = parse_var::<u32, _>(&lookup, "GW_BAUD")? {
            config.telemetry.baud = baud;
            config.transfer.baud = baud;
        }
        if let Some(maxlen) = parse_var::<usize, _>(&lookup, "GW_MAXLEN")? {
            config.telemetry.maxlen = maxlen;
        }
        if let Some(debug) = parse_var::<u8, _>(&lookup, "GW_DEBUG")? {
            config.telemetry.debug = debug;
            config.transfer.debug = debug;
        }
        if let Some(enabled) = flag_var(&lookup, "GW_ENABLE_TELEMETRY")? {
            config.enable_telemetry = enabled;
        }
        if let Some(enabled) = flag_var(&lookup, "GW_ENABLE_TRANSFER")? {
            config.enable_transfer = enabled;
        }
        if let Some(path) = lookup("GW_LOG_BASE_PATH") {
            config.transfer.log_base_path = path;
        }
        if let Some(interval) = parse_var::<u64, _>(&lookup, "GW_STATS_INTERVAL_MS")? {
            config.stats_interval_ms = interval;
        }

        Ok(config)
    }

    /// Reject configurations no proxy could run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enable_telemetry {
            let endpoint = self
                .telemetry
                .parse_endpoint()
                .map_err(|source| ConfigError::Component {
                    component: "telemetry",
                    source,
                })?;
            if !matches!(
                endpoint.kind,
                EndpointKind::Sim | EndpointKind::UdpIn | EndpointKind::UdpOut
            ) {
                return Err(ConfigError::UnsupportedTelemetry(
                    endpoint.kind.scheme().to_string(),
                ));
            }
        }
        if self.enable_transfer {
            let endpoint = self
                .transfer
                .validate()
                .map_err(|source| ConfigError::Component {
                    component: "transfer",
                    source,
                })?;
            if endpoint.kind != EndpointKind::Sim {
                return Err(ConfigError::UnsupportedTransfer(
                    endpoint.kind.scheme().to_string(),
                ));
            }
        }
        if self.stats_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                var: "stats_interval_ms".into(),
                value: "0".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    #[must_use]
    pub fn sim_heartbeat(&self) -> Duration {
        Duration::from_millis(self.sim_heartbeat_ms)
    }
}

fn parse_var<T, F>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            var: var.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })
}

fn flag_var<F>(lookup: &F, var: &str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    parse_flag(&raw)
        .map(Some)
        .ok_or_else(|| ConfigError::InvalidValue {
            var: var.to_string(),
            value: raw,
            reason: "expected true/false".into(),
        })
}
