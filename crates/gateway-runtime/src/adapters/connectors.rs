//! # Connector Selection
//!
//! ```text
//! sim:<name>            → SimulatedVehicle (shared by both proxies)
//! udp / udpin / udpout  → UdpLinkConnector<JsonCodec>
//! ```

use crate::container::config::{ConfigError, GatewayConfig};
use gw_01_telemetry_link::{JsonCodec, UdpLinkConnector};
use gw_02_file_transfer::{SimulatedVehicle, TransferConnector};
use shared_types::{EndpointKind, LinkConnector};
use std::sync::Arc;
use tracing::info;

/// Connectors for every enabled proxy.
#[derive(Default)]
pub struct Connectors {
    pub link: Option<Arc<dyn LinkConnector>>,
    pub transfer: Option<Arc<dyn TransferConnector>>,
    /// The in-process vehicle, when any endpoint is simulated.
    pub vehicle: Option<SimulatedVehicle>,
}

impl Connectors {
    /// Pick connectors for `config`. Call after [`GatewayConfig::validate`].
    pub fn for_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        Self::with_vehicle(config, SimulatedVehicle::demo())
    }

    /// Like [`for_config`](Self::for_config) but simulated endpoints use
    /// `vehicle`.
    pub fn with_vehicle(
        config: &GatewayConfig,
        vehicle: SimulatedVehicle,
    ) -> Result<Self, ConfigError> {
        let mut connectors = Self::default();
        let mut uses_sim = false;

        if config.enable_telemetry {
            let endpoint = config
                .telemetry
                .parse_endpoint()
                .map_err(|source| ConfigError::Component {
                    component: "telemetry",
                    source,
                })?;
            let link: Arc<dyn LinkConnector> = match endpoint.kind {
                EndpointKind::Sim => {
                    uses_sim = true;
                    Arc::new(vehicle.clone())
                }
                EndpointKind::UdpIn | EndpointKind::UdpOut => {
                    Arc::new(UdpLinkConnector::new(JsonCodec))
                }
                other => {
                    return Err(ConfigError::UnsupportedTelemetry(other.scheme().to_string()))
                }
            };
            info!(endpoint = %config.telemetry.endpoint, kind = endpoint.kind.scheme(), "Telemetry connector selected");
            connectors.link = Some(link);
        }

        if config.enable_transfer {
            let endpoint = config
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
            uses_sim = true;
            info!(endpoint = %config.transfer.endpoint, "Transfer connector selected");
            connectors.transfer = Some(Arc::new(vehicle.clone()));
        }

        if uses_sim {
            connectors.vehicle = Some(vehicle);
        }
        Ok(connectors)
    }
}
