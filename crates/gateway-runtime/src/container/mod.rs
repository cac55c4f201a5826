//! # Proxy Container
//!
//! Holds the configured proxies and the shared simulated vehicle, and owns
//! their start and stop order.

pub mod config;
pub mod proxies;

pub use config::{ConfigError, GatewayConfig};
pub use proxies::ProxyContainer;
