//! # Gateway Runtime
//!
//! Owns the proxy container, the background tasks and the shutdown signal.
//!
//! ## Startup Sequence
//!
//! 1. Validate configuration
//! 2. Select connectors and build the proxies
//! 3. Register metrics
//! 4. Start the simulated vehicle heartbeat (when simulated)
//! 5. Start proxies in order
//! 6. Start the stats exporter

use crate::adapters::Connectors;
use crate::commands::{route_command, CommandError};
use crate::container::{ConfigError, GatewayConfig, ProxyContainer};
use crate::wiring::{spawn_sim_heartbeat, spawn_stats_exporter};
use gateway_telemetry::metrics::register_metrics;
use gateway_telemetry::TelemetryError;
use parking_lot::Mutex;
use serde_json::Value;
use shared_types::ProxyError;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Runtime errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("proxy error: {0}")]
    Proxy(#[from] ProxyError),

    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

/// The running gateway.
pub struct GatewayRuntime {
    container: Arc<ProxyContainer>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl GatewayRuntime {
    /// Build the runtime. Nothing connects until [`start`](Self::start).
    pub fn new(config: GatewayConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        let connectors = Connectors::for_config(&config)?;
        Self::with_connectors(config, connectors)
    }

    /// Build the runtime over caller-supplied connectors.
    pub fn with_connectors(
        config: GatewayConfig,
        connectors: Connectors,
    ) -> Result<Self, RuntimeError> {
        let container = Arc::new(ProxyContainer::new(config, connectors)?);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            container,
            shutdown_tx,
            shutdown_rx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn container(&self) -> &Arc<ProxyContainer> {
        &self.container
    }

    /// Start proxies and background tasks. On a proxy failure every task
    /// and proxy already started is stopped again.
    pub async fn start(&self) -> Result<(), RuntimeError> {
        let config = &self.container.config;
        info!("===========================================");
        info!("  Vehicle Gateway v{}", crate::VERSION);
        info!("===========================================");

        register_metrics()?;

        if let Some(vehicle) = &self.container.vehicle {
            let task = spawn_sim_heartbeat(
                vehicle.clone(),
                config.sim_heartbeat(),
                self.shutdown_rx.clone(),
            );
            self.tasks.lock().push(task);
            info!(system_id = vehicle.target().system_id, "Simulated vehicle online");
        }

        if let Err(err) = self.container.start_all().await {
            error!(error = %err, "Gateway start failed, rolling back");
            self.shutdown().await;
            return Err(err.into());
        }

        let exporter = spawn_stats_exporter(
            Arc::clone(&self.container),
            config.stats_interval(),
            self.shutdown_rx.clone(),
        );
        self.tasks.lock().push(exporter);

        info!(
            telemetry = ?config.enable_telemetry.then_some(&config.telemetry.endpoint),
            transfer = ?config.enable_transfer.then_some(&config.transfer.endpoint),
            "Gateway running"
        );
        Ok(())
    }

    /// Run one named command.
    pub async fn execute(&self, command: &str, params: Option<&Value>) -> Result<Value, CommandError> {
        route_command(&self.container, command, params).await
    }

    /// A receiver that flips to `true` on shutdown.
    #[must_use]
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Stop background tasks, then the proxies. Safe to call twice.
    pub async fn shutdown(&self) {
        info!("Gateway shutting down");
        let _ = self.shutdown_tx.send(true);
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        self.container.stop_all().await;
        info!("Gateway stopped");
    }
}
