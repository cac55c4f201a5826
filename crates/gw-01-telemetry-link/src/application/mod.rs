//! Application layer: the link driver and the proxy built on it.

pub mod driver;
pub mod service;

pub use driver::TelemetryLinkDriver;
pub use service::{TelemetryLinkProxy, PROXY_NAME};
