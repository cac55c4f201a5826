//! # Proxy Container
//!
//! ## Start Order
//!
//! ```text
//! 1. telemetry_link   (heartbeat, bridge threads)
//! 2. file_transfer    (heartbeat, log index)
//! ```
//!
//! Stop runs in reverse. A proxy that fails to start leaves the ones
//! already running untouched; the caller decides whether to stop them.

use crate::adapters::Connectors;
use crate::container::config::GatewayConfig;
use chrono::{DateTime, Utc};
use gateway_telemetry::component_span;
use gw_01_telemetry_link::TelemetryLinkProxy;
use gw_02_file_transfer::{FileTransferProxy, SimulatedVehicle};
use shared_types::{Proxy, ProxyError, ProxyInfo};
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Every proxy the gateway runs.
pub struct ProxyContainer {
    pub config: GatewayConfig,
    pub telemetry: Option<Arc<TelemetryLinkProxy>>,
    pub transfer: Option<Arc<FileTransferProxy>>,
    /// Present when any endpoint is simulated.
    pub vehicle: Option<SimulatedVehicle>,
    started_at: DateTime<Utc>,
}

impl ProxyContainer {
    /// Build the enabled proxies. Nothing connects until
    /// [`start_all`](Self::start_all).
    #[instrument(name = "proxy_init", skip_all)]
    pub fn new(config: GatewayConfig, connectors: Connectors) -> Result<Self, ProxyError> {
        let telemetry = match (config.enable_telemetry, connectors.link) {
            (true, Some(link)) => {
                let span = component_span!(
                    "telemetry_link",
                    endpoint = %config.telemetry.endpoint
                );
                let proxy = TelemetryLinkProxy::with_span(config.telemetry.clone(), link, span)?;
                info!(endpoint = %config.telemetry.endpoint, maxlen = config.telemetry.maxlen, "Telemetry link proxy created");
                Some(Arc::new(proxy))
            }
            (true, None) => return Err(missing_connector("telemetry_link")),
            (false, _) => None,
        };

        let transfer = match (config.enable_transfer, connectors.transfer) {
            (true, Some(connector)) => {
                let span = component_span!(
                    "file_transfer",
                    endpoint = %config.transfer.endpoint
                );
                let proxy = FileTransferProxy::with_span(config.transfer.clone(), connector, span)?;
                info!(endpoint = %config.transfer.endpoint, base = %config.transfer.log_base_path, "File transfer proxy created");
                Some(Arc::new(proxy))
            }
            (true, None) => return Err(missing_connector("file_transfer")),
            (false, _) => None,
        };

        Ok(Self {
            config,
            telemetry,
            transfer,
            vehicle: connectors.vehicle,
            started_at: Utc::now(),
        })
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Proxies in start order.
    #[must_use]
    pub fn proxies(&self) -> Vec<Arc<dyn Proxy>> {
        let mut proxies: Vec<Arc<dyn Proxy>> = Vec::new();
        if let Some(telemetry) = &self.telemetry {
            proxies.push(Arc::clone(telemetry) as Arc<dyn Proxy>);
        }
        if let Some(transfer) = &self.transfer {
            proxies.push(Arc::clone(transfer) as Arc<dyn Proxy>);
        }
        proxies
    }

    /// Start every proxy in order, stopping at the first failure.
    pub async fn start_all(&self) -> Result<(), ProxyError> {
        for proxy in self.proxies() {
            info!(proxy = proxy.name(), "Starting proxy");
            if let Err(err) = proxy.start().await {
                error!(proxy = proxy.name(), kind = %err.kind(), error = %err, "Proxy failed to start");
                return Err(err);
            }
        }
        Ok(())
    }

    /// Stop every proxy in reverse order. Failures are logged and skipped.
    pub async fn stop_all(&self) {
        for proxy in self.proxies().into_iter().rev() {
            match proxy.stop().await {
                Ok(()) => info!(proxy = proxy.name(), "Proxy stopped"),
                Err(err) => error!(proxy = proxy.name(), error = %err, "Proxy failed to stop"),
            }
        }
    }

    #[must_use]
    pub fn infos(&self) -> Vec<ProxyInfo> {
        self.proxies().iter().map(|proxy| proxy.info()).collect()
    }
}

fn missing_connector(proxy: &str) -> ProxyError {
    ProxyError::Validation(format!("{proxy} is enabled but has no connector"))
}
