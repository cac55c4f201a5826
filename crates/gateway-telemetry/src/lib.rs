//! # Gateway Telemetry
//!
//! Observability for the vehicle gateway: structured logging through
//! `tracing-subscriber` and Prometheus metrics.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gateway_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     let _guard = init_telemetry(&config).expect("Failed to init telemetry");
//!     // Logs and metrics are now being collected
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GW_SERVICE_NAME` | `vehicle-gateway` | Service name on every log line |
//! | `GW_LOG_LEVEL` | `info` | Log filter (falls back to `RUST_LOG`) |
//! | `GW_CONSOLE_OUTPUT` | `true` | Print logs |
//! | `GW_JSON_LOGS` | `false` | JSON log lines |

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod logging;
pub mod metrics;

pub use config::{parse_flag, TelemetryConfig};
pub use logging::{env_filter, init_logging, LoggingGuard};
pub use metrics::{
    encode_metrics, register_metrics, BRIDGE_HANDLER_FAILURES, BRIDGE_MAILBOX_EVICTIONS,
    BRIDGE_MESSAGES_RECEIVED, BRIDGE_MESSAGES_SENT, COMMANDS_HANDLED, TRANSFER_BYTES_DOWNLOADED,
    TRANSFER_LS_RETRIES, TRANSFER_OPERATIONS,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Register metrics and install logging.
///
/// Returns a guard that must be held for the lifetime of the application.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    register_metrics()?;
    let logging = init_logging(config)?;
    Ok(TelemetryGuard { _logging: logging })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _logging: LoggingGuard,
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
