//! Keeps the simulated vehicle alive: a heartbeat on every open link at a
//! fixed period, the way a real autopilot announces itself.

use gw_02_file_transfer::SimulatedVehicle;
use shared_types::link::loopback::heartbeat;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

pub fn spawn_sim_heartbeat(
    vehicle: SimulatedVehicle,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let beat = heartbeat(vehicle.target());
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => vehicle.broadcast(&beat),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!(system_id = vehicle.target().system_id, "Simulated heartbeat stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{LinkConnection, LinkConnector, LinkEndpoint};

    #[tokio::test]
    async fn test_heartbeat_reaches_open_links() {
        let vehicle = SimulatedVehicle::demo();
        let mut link = LinkConnector::connect(&vehicle, &LinkEndpoint::sim("hb")).unwrap();
        // Drain the heartbeat injected at connect.
        while link.try_recv().unwrap().is_some() {}

        let (tx, rx) = watch::channel(false);
        let task = spawn_sim_heartbeat(vehicle.clone(), Duration::from_millis(5), rx);
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        task.await.unwrap();

        let mut beats = 0;
        while let Some(message) = link.try_recv().unwrap() {
            if message.is_heartbeat() {
                beats += 1;
            }
        }
        assert!(beats >= 2);
    }
}
