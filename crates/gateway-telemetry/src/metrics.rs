//! Prometheus metrics for the gateway.
//!
//! All metrics follow the naming convention: `gw_<component>_<metric>`
//!
//! Bridge figures are gauges mirroring the runtime's own counters; they
//! are refreshed by a periodic export task rather than incremented in the
//! hot path. Transfer and command outcomes are counters.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // BRIDGE METRICS
    // =========================================================================

    /// Messages handed to the driver for transmission
    pub static ref BRIDGE_MESSAGES_SENT: IntGaugeVec = IntGaugeVec::new(
        Opts::new("gw_bridge_messages_sent", "Messages written to the link by each bridge"),
        &["bridge"]
    ).expect("metric creation failed");

    /// Messages read from the driver (after fan-out)
    pub static ref BRIDGE_MESSAGES_RECEIVED: IntGaugeVec = IntGaugeVec::new(
        Opts::new("gw_bridge_messages_received", "Keyed messages read from the link by each bridge"),
        &["bridge"]
    ).expect("metric creation failed");

    /// Handlers that failed or panicked
    pub static ref BRIDGE_HANDLER_FAILURES: IntGaugeVec = IntGaugeVec::new(
        Opts::new("gw_bridge_handler_failures", "Handler invocations that failed"),
        &["bridge"]
    ).expect("metric creation failed");

    /// Messages dropped by a full mailbox
    pub static ref BRIDGE_MAILBOX_EVICTIONS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("gw_bridge_mailbox_evictions", "Messages evicted from full mailboxes"),
        &["bridge", "direction"]  // direction: inbound/outbound
    ).expect("metric creation failed");

    // =========================================================================
    // TRANSFER METRICS
    // =========================================================================

    /// Transfer operations by outcome
    pub static ref TRANSFER_OPERATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("gw_transfer_operations_total", "File-transfer operations"),
        &["operation", "outcome"]  // outcome: ok/timeout/validation/transport/...
    ).expect("metric creation failed");

    /// Directory listing retries
    pub static ref TRANSFER_LS_RETRIES: IntGauge = IntGauge::new(
        "gw_transfer_ls_retries",
        "Directory listings retried after a failure"
    ).expect("metric creation failed");

    /// Bytes written by completed downloads
    pub static ref TRANSFER_BYTES_DOWNLOADED: IntGauge = IntGauge::new(
        "gw_transfer_bytes_downloaded",
        "Bytes written by completed downloads"
    ).expect("metric creation failed");

    // =========================================================================
    // COMMAND METRICS
    // =========================================================================

    /// Commands executed by the gateway
    pub static ref COMMANDS_HANDLED: IntCounterVec = IntCounterVec::new(
        Opts::new("gw_commands_handled_total", "Commands executed by name and outcome"),
        &["command", "outcome"]
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry. Safe to call more than
/// once.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Bridge
        Box::new(BRIDGE_MESSAGES_SENT.clone()),
        Box::new(BRIDGE_MESSAGES_RECEIVED.clone()),
        Box::new(BRIDGE_HANDLER_FAILURES.clone()),
        Box::new(BRIDGE_MAILBOX_EVICTIONS.clone()),
        // Transfer
        Box::new(TRANSFER_OPERATIONS.clone()),
        Box::new(TRANSFER_LS_RETRIES.clone()),
        Box::new(TRANSFER_BYTES_DOWNLOADED.clone()),
        // Commands
        Box::new(COMMANDS_HANDLED.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Convert a counter reading to a gauge value.
#[must_use]
pub fn gauge_value(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_twice() {
        register_metrics().unwrap();
        register_metrics().unwrap();
    }

    #[test]
    fn test_encode_contains_metric() {
        register_metrics().unwrap();
        TRANSFER_OPERATIONS
            .with_label_values(&["list_logs", "ok"])
            .inc();
        let text = encode_metrics().unwrap();
        assert!(text.contains("gw_transfer_operations_total"));
    }

    #[test]
    fn test_gauge_set() {
        BRIDGE_MESSAGES_SENT.with_label_values(&["test"]).set(42);
        assert_eq!(BRIDGE_MESSAGES_SENT.with_label_values(&["test"]).get(), 42);
    }

    #[test]
    fn test_gauge_value_saturates() {
        assert_eq!(gauge_value(7), 7);
        assert_eq!(gauge_value(u64::MAX), i64::MAX);
    }
}
