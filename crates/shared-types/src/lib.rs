//! # Shared Types Crate
//!
//! Types that cross crate boundaries inside the gateway: the decoded link
//! message, routing keys, endpoint addressing, the caller-facing error
//! taxonomy and the [`Proxy`] lifecycle contract.
//!
//! ## Design Principles
//!
//! - **Decoded view only**: wire encoding lives behind a [`LinkConnection`];
//!   everything above it sees [`LinkMessage`] values.
//! - **One error surface**: every proxy operation fails with a
//!   [`ProxyError`] whose [`ErrorKind`] callers can branch on.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod endpoint;
pub mod errors;
pub mod link;
pub mod message;
pub mod proxy_trait;
pub mod requests;

pub use endpoint::{EndpointKind, LinkEndpoint, DEFAULT_BAUD};
pub use errors::*;
pub use link::loopback::{LoopbackConnector, LoopbackHandle};
pub use link::{LinkConnection, LinkConnector};
pub use message::*;
pub use proxy_trait::{Proxy, ProxyInfo, ProxyStatus};
