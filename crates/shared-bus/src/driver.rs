//! # Link Driver Interface
//!
//! A driver owns one link and turns it into keyed traffic for the bridge.
//! The bridge calls it only from its I/O thread, in this order per cycle:
//!
//! ```text
//! open(abort) ─→ [ write_once(pending) ─→ read_once() ]* ─→ close()
//! ```

use shared_types::RoutingKey;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Outbound messages drained from the mailboxes, grouped by key.
pub type OutboundBatch<M> = BTreeMap<RoutingKey, Vec<M>>;

/// Failure to bring a link up.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    /// The liveness signal never arrived.
    #[error("Timed out after {timeout_ms} ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },

    /// The link could not be opened.
    #[error("Transport error: {0}")]
    Transport(String),

    /// `stop()` was requested before the link came up.
    #[error("Open aborted by stop request")]
    Aborted,
}

/// Raised by the bridge when `stop()` arrives while `open` is running.
///
/// Drivers whose `open` can block for long should poll [`is_aborted`]
/// and give up with [`DriverError::Aborted`].
///
/// [`is_aborted`]: OpenAbort::is_aborted
#[derive(Debug, Clone, Default)]
pub struct OpenAbort(Arc<AtomicBool>);

impl OpenAbort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Contract between the bridge and a concrete link.
pub trait LinkDriver: Send + 'static {
    /// Unit of traffic. Its `Display` form feeds duplicate filtering.
    type Message: Clone + fmt::Display + Send + Sync + 'static;

    /// Short name for logs and thread names.
    fn name(&self) -> &str;

    /// Establish the link. May block until the remote side is alive, or
    /// until `abort` is raised.
    fn open(&mut self, abort: &OpenAbort) -> Result<(), DriverError>;

    /// Non-blocking read of whatever arrived since the last call, with the
    /// key each message should be published under. One message may appear
    /// under several keys.
    fn read_once(&mut self) -> Vec<(RoutingKey, Self::Message)>;

    /// Transmit pending traffic. Errors are the driver's to log; they never
    /// reach the bridge.
    fn write_once(&mut self, pending: OutboundBatch<Self::Message>);

    /// Release the link. Must be safe to call when `open` never ran.
    fn close(&mut self);
}
