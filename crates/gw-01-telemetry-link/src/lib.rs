//! # GW-01 Telemetry Link
//!
//! Proxy for the vehicle's telemetry link.
//!
//! **Architecture:** Hexagonal (Ports/Adapters) on top of the shared bridge
//!
//! ## Purpose
//!
//! - Wait for the vehicle's heartbeat before declaring the link up
//! - Publish every inbound message under three keys: numeric id, type name
//!   and the generic key
//! - Transmit everything callers queue on the generic key
//! - Offer a request/reply helper with a bounded wait
//!
//! ## Module Structure
//!
//! ```text
//! gw-01-telemetry-link/
//! ├── domain/          # Routing keys and fan-out
//! ├── adapters/        # UDP link and frame codec
//! ├── application/     # TelemetryLinkDriver + TelemetryLinkProxy
//! └── config.rs        # TelemetryLinkConfig
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;

pub use adapters::{JsonCodec, LinkCodec, UdpLinkConnector};
pub use application::{TelemetryLinkDriver, TelemetryLinkProxy};
pub use config::TelemetryLinkConfig;
pub use domain::{fan_out, GENERIC_KEY};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
