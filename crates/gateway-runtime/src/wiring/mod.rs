//! # Runtime Wiring
//!
//! Background tasks that run alongside the proxies:
//!
//! ```text
//! stats exporter   proxy counters ──→ prometheus gauges   (every stats_interval)
//! sim heartbeat    SimulatedVehicle ──→ HEARTBEAT on every open link
//! ```
//!
//! Both stop when the shutdown watch flips to `true`.

pub mod sim;
pub mod stats;

pub use sim::spawn_sim_heartbeat;
pub use stats::{export_stats, spawn_stats_exporter};
