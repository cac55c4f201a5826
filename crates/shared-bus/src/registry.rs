//! # Handler Registry
//!
//! Maps routing keys to ordered handler lists. Each registration may carry
//! a duplicate-filter window: a message whose text equals the previous one
//! that handler was given, arriving within the window, is not delivered.
//!
//! Duplicate state is per registration. Two handlers on the same key with
//! their own windows never suppress each other.

use parking_lot::Mutex;
use shared_types::RoutingKey;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, trace};

/// Error a handler reports back to the dispatcher.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Callback invoked for each dispatched message.
pub type HandlerFn<M> = Arc<dyn Fn(&M) -> Result<(), HandlerError> + Send + Sync>;

/// Identity of one registration, returned by [`HandlerRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

struct Registration<M> {
    id: HandlerId,
    callback: HandlerFn<M>,
    duplicate_window: Option<Duration>,
    /// Text and time of the last message delivered to this handler.
    last_delivered: Option<(String, Instant)>,
    /// Cleared by `unregister`; checked right before each invocation.
    live: Arc<AtomicBool>,
}

/// Outcome of dispatching one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that were called.
    pub invoked: usize,
    /// Handlers skipped by their duplicate filter.
    pub suppressed: usize,
    /// Called handlers that returned an error or panicked.
    pub failed: usize,
}

/// Thread-safe key → handler list map.
pub struct HandlerRegistry<M> {
    buckets: Mutex<HashMap<RoutingKey, Vec<Registration<M>>>>,
    next_id: AtomicU64,
}

impl<M> Default for HandlerRegistry<M> {
    fn default() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<M: fmt::Display> HandlerRegistry<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `key`. Handlers run in registration order.
    ///
    /// With `duplicate_window` set, a message rendering to the same text as
    /// the last one delivered to this handler is skipped until the window
    /// has elapsed.
    pub fn register<F>(
        &self,
        key: impl Into<RoutingKey>,
        handler: F,
        duplicate_window: Option<Duration>,
    ) -> HandlerId
    where
        F: Fn(&M) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let key = key.into();
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let window_ms = duplicate_window.map(|w| w.as_millis());
        self.buckets
            .lock()
            .entry(key.clone())
            .or_default()
            .push(Registration {
                id,
                callback: Arc::new(handler),
                duplicate_window,
                last_delivered: None,
                live: Arc::new(AtomicBool::new(true)),
            });
        debug!(key = %key, handler = %id, ?window_ms, "Handler registered");
        id
    }

    /// Remove one registration. Unknown keys or ids are a no-op returning
    /// `false`. A key whose last handler is removed disappears.
    ///
    /// A dispatch running concurrently skips the handler unless it has
    /// already passed its liveness check, so at most one in-flight
    /// invocation can still start or finish after this returns.
    pub fn unregister(&self, key: &str, id: HandlerId) -> bool {
        let mut buckets = self.buckets.lock();
        let Some(bucket) = buckets.get_mut(key) else {
            debug!(key, handler = %id, "Unregister for unknown key ignored");
            return false;
        };
        let before = bucket.len();
        bucket.retain(|registration| {
            let keep = registration.id != id;
            if !keep {
                registration.live.store(false, Ordering::Release);
            }
            keep
        });
        let removed = bucket.len() != before;
        if bucket.is_empty() {
            buckets.remove(key);
        }
        if removed {
            debug!(key, handler = %id, "Handler unregistered");
        } else {
            debug!(key, handler = %id, "Unregister for unknown handler ignored");
        }
        removed
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.buckets.lock().contains_key(key)
    }

    #[must_use]
    pub fn handler_count(&self, key: &str) -> usize {
        self.buckets.lock().get(key).map_or(0, Vec::len)
    }

    /// Deliver `message` to every handler registered for `key`.
    pub fn dispatch(&self, key: &str, message: &M) -> DispatchReport {
        self.dispatch_at(key, message, Instant::now())
    }

    /// [`dispatch`](Self::dispatch) with an explicit clock reading.
    ///
    /// Filtering decisions are made under the registry lock; the callbacks
    /// themselves run after it is released.
    pub fn dispatch_at(&self, key: &str, message: &M, now: Instant) -> DispatchReport {
        let mut report = DispatchReport::default();

        let selected: Vec<(HandlerId, HandlerFn<M>, Arc<AtomicBool>)> = {
            let mut buckets = self.buckets.lock();
            let Some(bucket) = buckets.get_mut(key) else {
                return report;
            };
            let mut rendered: Option<String> = None;
            let mut selected = Vec::with_capacity(bucket.len());
            for registration in bucket.iter_mut() {
                if let Some(window) = registration.duplicate_window {
                    let text = rendered.get_or_insert_with(|| message.to_string());
                    if let Some((last_text, last_at)) = &registration.last_delivered {
                        if last_text.as_str() == text.as_str()
                            && now.saturating_duration_since(*last_at) < window
                        {
                            trace!(key, handler = %registration.id, "Duplicate suppressed");
                            report.suppressed += 1;
                            continue;
                        }
                    }
                    registration.last_delivered = Some((text.clone(), now));
                }
                selected.push((
                    registration.id,
                    Arc::clone(&registration.callback),
                    Arc::clone(&registration.live),
                ));
            }
            selected
        };

        for (id, callback, live) in selected {
            if !live.load(Ordering::Acquire) {
                trace!(key, handler = %id, "Handler unregistered during dispatch, skipped");
                continue;
            }
            report.invoked += 1;
            match panic::catch_unwind(AssertUnwindSafe(|| callback(message))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    report.failed += 1;
                    error!(key, handler = %id, error = %err, "Handler failed");
                }
                Err(_) => {
                    report.failed += 1;
                    error!(key, handler = %id, "Handler panicked");
                }
            }
        }
        report
    }
}
