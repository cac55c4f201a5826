//! One-shot latch for cross-thread completion signals.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A flag that is set once and can be awaited with a timeout.
#[derive(Debug, Default)]
pub struct Latch {
    fired: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the latch and wake every waiter. Idempotent.
    pub fn set(&self) {
        *self.fired.lock() = true;
        self.cond.notify_all();
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        *self.fired.lock()
    }

    /// Block until set or `timeout` elapses. Returns whether it was set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut fired = self.fired.lock();
        while !*fired {
            if self.cond.wait_until(&mut fired, deadline).timed_out() {
                return *fired;
            }
        }
        true
    }
}
