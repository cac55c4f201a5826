//! Cross-crate flows. Every test drives real proxies over in-process links.

pub mod gateway_flow;
pub mod telemetry_flow;
pub mod transfer_flow;

use std::time::{Duration, Instant};

/// Poll `check` every few milliseconds until it holds or `timeout` passes.
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut check: F) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}
