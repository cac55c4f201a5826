//! Periodic export of proxy counters into the metrics registry.

use crate::container::ProxyContainer;
use gateway_telemetry::metrics::{
    gauge_value, BRIDGE_HANDLER_FAILURES, BRIDGE_MAILBOX_EVICTIONS, BRIDGE_MESSAGES_RECEIVED,
    BRIDGE_MESSAGES_SENT, TRANSFER_BYTES_DOWNLOADED, TRANSFER_LS_RETRIES,
};
use gw_02_file_transfer::TransferStatsSnapshot;
use shared_bus::BridgeStatsSnapshot;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Mirror one bridge's counters into the bridge gauges.
pub fn record_bridge(bridge: &str, stats: &BridgeStatsSnapshot) {
    BRIDGE_MESSAGES_SENT
        .with_label_values(&[bridge])
        .set(gauge_value(stats.sent));
    BRIDGE_MESSAGES_RECEIVED
        .with_label_values(&[bridge])
        .set(gauge_value(stats.received));
    BRIDGE_HANDLER_FAILURES
        .with_label_values(&[bridge])
        .set(gauge_value(stats.handler_failures));
    BRIDGE_MAILBOX_EVICTIONS
        .with_label_values(&[bridge, "outbound"])
        .set(gauge_value(stats.outbound_evicted));
    BRIDGE_MAILBOX_EVICTIONS
        .with_label_values(&[bridge, "inbound"])
        .set(gauge_value(stats.inbound_evicted));
}

pub fn record_transfer(stats: &TransferStatsSnapshot) {
    TRANSFER_LS_RETRIES.set(gauge_value(stats.ls_retries));
    TRANSFER_BYTES_DOWNLOADED.set(gauge_value(stats.bytes_downloaded));
}

/// Export every proxy's counters once.
pub fn export_stats(container: &ProxyContainer) {
    if let Some(telemetry) = &container.telemetry {
        let stats = telemetry.stats();
        record_bridge(gw_01_telemetry_link::application::PROXY_NAME, &stats);
        debug!(
            sent = stats.sent,
            received = stats.received,
            delivered = stats.delivered,
            suppressed = stats.suppressed,
            "Telemetry bridge stats exported"
        );
    }
    if let Some(transfer) = &container.transfer {
        record_transfer(&transfer.stats());
    }
}

/// Export stats every `interval` until `shutdown` becomes `true`.
pub fn spawn_stats_exporter(
    container: Arc<ProxyContainer>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => export_stats(&container),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        export_stats(&container);
        info!("Stats exporter stopped");
    })
}
