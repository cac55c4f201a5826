//! # Link Connection Seam
//!
//! A [`LinkConnector`] opens a [`LinkConnection`] for an endpoint. The
//! connection is the only place that touches bytes; it exchanges decoded
//! [`LinkMessage`] values with everything above it.

pub mod loopback;

use crate::endpoint::LinkEndpoint;
use crate::errors::LinkError;
use crate::message::LinkMessage;
use std::time::{Duration, Instant};
use tracing::debug;

/// Poll period of the default [`LinkConnection::wait_heartbeat`].
pub const HEARTBEAT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// One open connection to a vehicle.
pub trait LinkConnection: Send {
    /// Return the next decoded inbound message without blocking.
    fn try_recv(&mut self) -> Result<Option<LinkMessage>, LinkError>;

    /// Encode and transmit one message.
    fn send(&mut self, message: &LinkMessage) -> Result<(), LinkError>;

    fn endpoint(&self) -> &LinkEndpoint;

    /// Release the connection. Further calls fail with [`LinkError::Closed`].
    fn close(&mut self);

    /// Wait up to `timeout` for a heartbeat, discarding other traffic and
    /// frames that fail to decode.
    fn wait_heartbeat(&mut self, timeout: Duration) -> Result<Option<LinkMessage>, LinkError> {
        let deadline = Instant::now() + timeout;
        loop {
            let next = match self.try_recv() {
                Err(LinkError::Codec(reason)) => {
                    debug!(endpoint = %self.endpoint(), reason = %reason, "Undecodable frame skipped");
                    continue;
                }
                other => other?,
            };
            match next {
                Some(message) if message.is_heartbeat() => return Ok(Some(message)),
                Some(_) if Instant::now() < deadline => continue,
                None if Instant::now() < deadline => std::thread::sleep(HEARTBEAT_POLL_INTERVAL),
                _ => return Ok(None),
            }
        }
    }
}

/// Factory for connections.
pub trait LinkConnector: Send + Sync {
    fn connect(&self, endpoint: &LinkEndpoint) -> Result<Box<dyn LinkConnection>, LinkError>;
}
