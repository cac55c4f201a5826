//! # Telemetry Link Driver
//!
//! [`LinkDriver`] over a [`LinkConnection`]. `open` blocks until the
//! vehicle's heartbeat is seen, retrying one timeout at a time, or until
//! the bridge aborts it. Reads fan out each message to three keys and skip
//! frames that fail to decode; writes transmit only the generic key.

use crate::domain::{fan_out, GENERIC_KEY};
use parking_lot::RwLock;
use shared_bus::{DriverError, LinkDriver, OpenAbort, OutboundBatch};
use shared_types::{
    LinkConnection, LinkConnector, LinkEndpoint, LinkError, LinkMessage, LinkTarget, RoutingKey,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Most messages taken off the link in one `read_once`.
pub const MAX_READ_BATCH: usize = 512;

/// Longest stretch of a heartbeat wait between two abort checks.
pub const ABORT_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct TelemetryLinkDriver {
    endpoint: LinkEndpoint,
    connector: Arc<dyn LinkConnector>,
    connection: Option<Box<dyn LinkConnection>>,
    target: Arc<RwLock<Option<LinkTarget>>>,
    heartbeat_timeout: Duration,
    heartbeat_attempts: Option<u32>,
    debug: u8,
}

impl TelemetryLinkDriver {
    pub fn new(
        endpoint: LinkEndpoint,
        connector: Arc<dyn LinkConnector>,
        heartbeat_timeout: Duration,
        heartbeat_attempts: Option<u32>,
    ) -> Self {
        Self {
            endpoint,
            connector,
            connection: None,
            target: Arc::new(RwLock::new(None)),
            heartbeat_timeout,
            heartbeat_attempts,
            debug: 0,
        }
    }

    /// Trace every transmitted message when `debug > 0`.
    #[must_use]
    pub fn with_debug(mut self, debug: u8) -> Self {
        self.debug = debug;
        self
    }

    /// Vehicle addressing learned from the heartbeat; shared with the proxy.
    #[must_use]
    pub fn target_handle(&self) -> Arc<RwLock<Option<LinkTarget>>> {
        Arc::clone(&self.target)
    }

    /// One heartbeat attempt, cut into slices so an abort is seen within
    /// [`ABORT_POLL_INTERVAL`]. `Ok(None)` means the attempt timed out or
    /// was aborted.
    fn wait_heartbeat_attempt(
        &self,
        connection: &mut dyn LinkConnection,
        abort: &OpenAbort,
    ) -> Result<Option<LinkMessage>, LinkError> {
        let deadline = Instant::now() + self.heartbeat_timeout;
        loop {
            if abort.is_aborted() {
                return Ok(None);
            }
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Ok(None);
            }
            if let Some(heartbeat) = connection.wait_heartbeat(left.min(ABORT_POLL_INTERVAL))? {
                return Ok(Some(heartbeat));
            }
        }
    }

    fn total_wait_ms(&self, attempts: u32) -> u64 {
        let per_attempt = u64::try_from(self.heartbeat_timeout.as_millis()).unwrap_or(u64::MAX);
        per_attempt.saturating_mul(u64::from(attempts))
    }
}

impl LinkDriver for TelemetryLinkDriver {
    type Message = LinkMessage;

    fn name(&self) -> &str {
        "telemetry"
    }

    fn open(&mut self, abort: &OpenAbort) -> Result<(), DriverError> {
        let mut connection = self
            .connector
            .connect(&self.endpoint)
            .map_err(|e| DriverError::Transport(e.to_string()))?;

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.wait_heartbeat_attempt(connection.as_mut(), abort) {
                Ok(Some(heartbeat)) => {
                    info!(
                        endpoint = %self.endpoint,
                        system_id = heartbeat.source.system_id,
                        component_id = heartbeat.source.component_id,
                        "Heartbeat received, link up"
                    );
                    *self.target.write() = Some(heartbeat.source);
                    break;
                }
                Ok(None) if abort.is_aborted() => {
                    connection.close();
                    info!(endpoint = %self.endpoint, attempt, "Heartbeat wait aborted");
                    return Err(DriverError::Aborted);
                }
                Ok(None) => warn!(
                    endpoint = %self.endpoint,
                    baud = self.endpoint.baud,
                    attempt,
                    "No heartbeat yet, still waiting"
                ),
                Err(err) => warn!(
                    endpoint = %self.endpoint,
                    attempt,
                    error = %err,
                    "Link error while waiting for heartbeat"
                ),
            }
            if let Some(max) = self.heartbeat_attempts {
                if attempt >= max {
                    connection.close();
                    return Err(DriverError::Timeout {
                        what: "heartbeat".into(),
                        timeout_ms: self.total_wait_ms(max),
                    });
                }
            }
        }

        self.connection = Some(connection);
        Ok(())
    }

    fn read_once(&mut self) -> Vec<(RoutingKey, LinkMessage)> {
        let Some(connection) = self.connection.as_mut() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for _ in 0..MAX_READ_BATCH {
            match connection.try_recv() {
                Ok(Some(message)) => out.extend(fan_out(message)),
                Ok(None) => break,
                Err(LinkError::Codec(reason)) => {
                    debug!(reason = %reason, "Undecodable frame skipped");
                }
                Err(err) => {
                    warn!(error = %err, "Link read failed");
                    break;
                }
            }
        }
        out
    }

    fn write_once(&mut self, pending: OutboundBatch<LinkMessage>) {
        let Some(connection) = self.connection.as_mut() else {
            debug!("Link not open, outbound batch dropped");
            return;
        };
        for (key, messages) in pending {
            if key.as_str() != GENERIC_KEY {
                trace!(key = %key, count = messages.len(), "Non-generic outbound bucket ignored");
                continue;
            }
            for message in messages {
                if self.debug > 0 {
                    debug!(message = %message, "TX");
                }
                if let Err(err) = connection.send(&message) {
                    error!(msg_type = %message.msg_type, error = %err, "Failed to send link message");
                }
            }
        }
    }

    fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
            info!(endpoint = %self.endpoint, "Link closed");
        }
    }
}
