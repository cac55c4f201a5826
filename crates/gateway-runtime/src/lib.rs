//! # Gateway Runtime Library
//!
//! Wires the telemetry-link and file-transfer proxies into one process and
//! exposes their operations as named JSON commands. The `gateway-runtime`
//! binary in `main.rs` is a thin shell around [`GatewayRuntime`].
//!
//! ## Modular Structure
//!
//! - `container/` - Configuration and the proxy container
//! - `adapters/` - Connector selection per endpoint kind
//! - `commands/` - Command router and its errors
//! - `wiring/` - Stats export and the simulated heartbeat

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod commands;
pub mod container;
pub mod runtime;
pub mod wiring;

#[cfg(test)]
mod testing;

pub use adapters::Connectors;
pub use commands::{command_names, route_command, CommandError, CommandTable};
pub use container::{ConfigError, GatewayConfig, ProxyContainer};
pub use runtime::{GatewayRuntime, RuntimeError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
