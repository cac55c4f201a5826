//! Fixtures shared by the runtime's unit tests.

use crate::adapters::Connectors;
use crate::container::{GatewayConfig, ProxyContainer};
use gw_01_telemetry_link::TelemetryLinkConfig;
use gw_02_file_transfer::{FileTransferConfig, SimulatedVehicle};

/// Simulated endpoints with short waits.
pub(crate) fn test_config() -> GatewayConfig {
    GatewayConfig {
        telemetry: TelemetryLinkConfig::for_testing(),
        transfer: FileTransferConfig::for_testing(),
        stats_interval_ms: 20,
        sim_heartbeat_ms: 20,
        ..GatewayConfig::default()
    }
}

/// Build and start a container over the demo vehicle.
pub(crate) async fn started_container(config: GatewayConfig) -> (ProxyContainer, SimulatedVehicle) {
    let vehicle = SimulatedVehicle::demo();
    let connectors = Connectors::with_vehicle(&config, vehicle.clone()).unwrap();
    let container = ProxyContainer::new(config, connectors).unwrap();
    container.start_all().await.unwrap();
    (container, vehicle)
}
