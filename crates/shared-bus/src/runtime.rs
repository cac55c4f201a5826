//! # Bridge Runtime
//!
//! Runs one [`LinkDriver`] on a dedicated thread and exposes thread-safe
//! send and handler-registration entry points.
//!
//! ## Lifecycle
//!
//! ```text
//!            start()                  stop()
//! Stopped ─────────→ Starting ─→ Running ─────→ Stopping ─→ Stopped
//!    ↑                  │
//!    └── open() failed ─┤
//!    └─ stop() aborted ─┘
//! ```
//!
//! A `stop()` that arrives while `open()` is still running raises the
//! driver's [`OpenAbort`]. Once `open()` returns, `start()` closes the
//! driver instead of launching the loop and reports [`BusError::Aborted`].
//!
//! ## I/O Cycle
//!
//! Every iteration drains all outbound mailboxes into one batch, hands it
//! to `write_once`, polls `read_once`, and for each inbound message records
//! it in the inbound mailbox for its key and dispatches it to that key's
//! handlers. The loop then sleeps for the configured interval.

use crate::burst::{BurstScheduler, BurstSpec};
use crate::driver::{DriverError, LinkDriver, OpenAbort};
use crate::mailbox::{BoundedMailbox, MailboxSet};
use crate::registry::{DispatchReport, HandlerError, HandlerId, HandlerRegistry};
use crate::signal::Latch;
use crate::{DEFAULT_LOOP_INTERVAL_MS, DEFAULT_MAILBOX_CAPACITY, DEFAULT_STOP_TIMEOUT_MS};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use shared_types::{ProxyError, ProxyStatus, RoutingKey};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, info_span, trace, warn, Span};

// =============================================================================
// ERRORS
// =============================================================================

/// Lifecycle errors of a bridge.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("Bridge '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Bridge '{0}' is not running")]
    NotRunning(String),

    #[error("Driver failed to open: {0}")]
    Driver(#[from] DriverError),

    #[error("Failed to spawn thread: {0}")]
    Spawn(String),

    #[error("Bridge '{0}' was stopped while starting")]
    Aborted(String),
}

impl From<BusError> for ProxyError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Driver(DriverError::Timeout { what, timeout_ms }) => ProxyError::Timeout {
                operation: what,
                timeout_ms,
            },
            BusError::Driver(DriverError::Transport(reason)) => ProxyError::Transport(reason),
            BusError::NotRunning(name) | BusError::Aborted(name) => ProxyError::NotStarted(name),
            other => ProxyError::Transport(other.to_string()),
        }
    }
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Tuning of one bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Per-key mailbox capacity (inbound and outbound). 0 = unbounded.
    pub mailbox_capacity: usize,
    /// Sleep between loop iterations.
    pub loop_interval_ms: u64,
    /// Upper bound for each wait inside `stop()`.
    pub stop_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            loop_interval_ms: DEFAULT_LOOP_INTERVAL_MS,
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
        }
    }
}

impl BridgeConfig {
    /// Fast loop and short stop timeout for tests.
    pub fn for_testing() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            loop_interval_ms: 1,
            stop_timeout_ms: 1_000,
        }
    }

    #[must_use]
    pub fn loop_interval(&self) -> Duration {
        Duration::from_millis(self.loop_interval_ms)
    }

    #[must_use]
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

// =============================================================================
// STATE AND STATS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl From<BridgeState> for ProxyStatus {
    fn from(state: BridgeState) -> Self {
        match state {
            BridgeState::Stopped => ProxyStatus::Stopped,
            BridgeState::Starting => ProxyStatus::Starting,
            BridgeState::Running => ProxyStatus::Running,
            BridgeState::Stopping => ProxyStatus::Stopping,
        }
    }
}

#[derive(Debug, Default)]
struct BridgeStats {
    sent: AtomicU64,
    received: AtomicU64,
    delivered: AtomicU64,
    suppressed: AtomicU64,
    handler_failures: AtomicU64,
    cycles: AtomicU64,
}

impl BridgeStats {
    fn record_dispatch(&self, report: DispatchReport) {
        self.delivered
            .fetch_add(report.invoked as u64, Ordering::Relaxed);
        self.suppressed
            .fetch_add(report.suppressed as u64, Ordering::Relaxed);
        self.handler_failures
            .fetch_add(report.failed as u64, Ordering::Relaxed);
    }
}

/// Point-in-time copy of a bridge's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStatsSnapshot {
    /// Messages handed to `write_once`.
    pub sent: u64,
    /// Keyed messages returned by `read_once`.
    pub received: u64,
    /// Handler invocations.
    pub delivered: u64,
    /// Deliveries skipped by duplicate filters.
    pub suppressed: u64,
    /// Handler invocations that failed or panicked.
    pub handler_failures: u64,
    /// Outbound items lost to mailbox overflow.
    pub outbound_evicted: u64,
    /// Inbound items lost to mailbox overflow.
    pub inbound_evicted: u64,
    /// Completed loop iterations.
    pub cycles: u64,
}

// =============================================================================
// RUNTIME
// =============================================================================

/// State shared between the caller-facing handle and the I/O thread.
struct Shared<D: LinkDriver> {
    name: String,
    driver: Mutex<D>,
    outbox: MailboxSet<D::Message>,
    inbox: MailboxSet<D::Message>,
    handlers: HandlerRegistry<D::Message>,
    running: AtomicBool,
    abort: OpenAbort,
    stats: BridgeStats,
    config: BridgeConfig,
    span: Span,
}

struct LoopThread {
    handle: JoinHandle<()>,
    exited: Arc<Latch>,
}

/// Sets the exit latch even if the loop unwinds.
struct ExitGuard(Arc<Latch>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.set();
    }
}

/// Owner of a driver and the thread that runs it.
pub struct BridgeRuntime<D: LinkDriver> {
    shared: Arc<Shared<D>>,
    state: Mutex<BridgeState>,
    state_changed: Condvar,
    worker: Mutex<Option<LoopThread>>,
    bursts: BurstScheduler<D::Message>,
}

impl<D: LinkDriver> BridgeRuntime<D> {
    pub fn new(driver: D, config: BridgeConfig) -> Self {
        let span = info_span!("bridge", name = %driver.name());
        Self::with_span(driver, config, span)
    }

    /// Create a bridge whose threads log inside `span`.
    pub fn with_span(driver: D, config: BridgeConfig, span: Span) -> Self {
        let name = driver.name().to_string();
        let bursts = BurstScheduler::new(&name, span.clone());
        Self {
            shared: Arc::new(Shared {
                name,
                driver: Mutex::new(driver),
                outbox: MailboxSet::new(config.mailbox_capacity),
                inbox: MailboxSet::new(config.mailbox_capacity),
                handlers: HandlerRegistry::new(),
                running: AtomicBool::new(false),
                abort: OpenAbort::new(),
                stats: BridgeStats::default(),
                config,
                span,
            }),
            state: Mutex::new(BridgeState::Stopped),
            state_changed: Condvar::new(),
            worker: Mutex::new(None),
            bursts,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    #[must_use]
    pub fn state(&self) -> BridgeState {
        *self.state.lock()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == BridgeState::Running
    }

    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.shared.config
    }

    /// Open the driver and launch the I/O thread.
    ///
    /// Blocks for as long as the driver's `open` does. On failure the bridge
    /// is back in `Stopped` and can be started again.
    pub fn start(&self) -> Result<(), BusError> {
        {
            let mut state = self.state.lock();
            if *state != BridgeState::Stopped {
                return Err(BusError::AlreadyRunning(self.shared.name.clone()));
            }
            *state = BridgeState::Starting;
            self.shared.abort.reset();
        }
        let _entered = self.shared.span.enter();

        let opened = self.shared.driver.lock().open(&self.shared.abort);

        let mut state = self.state.lock();
        if self.shared.abort.is_aborted() {
            if opened.is_ok() {
                self.shared.driver.lock().close();
            }
            self.settle(&mut state, BridgeState::Stopped);
            info!("Stop requested during start, bridge not launched");
            return Err(BusError::Aborted(self.shared.name.clone()));
        }
        if let Err(err) = opened {
            error!(error = %err, "Driver failed to open");
            self.settle(&mut state, BridgeState::Stopped);
            return Err(err.into());
        }

        self.shared.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let exited = Arc::new(Latch::new());
        let guard = ExitGuard(Arc::clone(&exited));
        let spawned = thread::Builder::new()
            .name(format!("bridge-{}", self.shared.name))
            .spawn(move || {
                let _guard = guard;
                run_loop(&shared);
            });

        match spawned {
            Ok(handle) => {
                *self.worker.lock() = Some(LoopThread { handle, exited });
                self.settle(&mut state, BridgeState::Running);
                info!(
                    mailbox_capacity = self.shared.config.mailbox_capacity,
                    loop_interval_ms = self.shared.config.loop_interval_ms,
                    "Bridge started"
                );
                Ok(())
            }
            Err(err) => {
                self.shared.running.store(false, Ordering::Release);
                self.shared.driver.lock().close();
                self.settle(&mut state, BridgeState::Stopped);
                Err(BusError::Spawn(err.to_string()))
            }
        }
    }

    /// Stop the I/O thread and close the driver.
    ///
    /// Waits at most `stop_timeout` for the thread and again at most
    /// `stop_timeout` for the driver. A thread that does not exit in time is
    /// detached. Stopping a bridge that is not running is a no-op.
    ///
    /// While the bridge is `Starting`, the pending `open()` is aborted and
    /// this waits at most `stop_timeout` for `start()` to unwind. If `open()`
    /// ignores the abort for longer, the bridge still stops as soon as it
    /// returns.
    pub fn stop(&self) -> Result<(), BusError> {
        let timeout = self.shared.config.stop_timeout();
        {
            let mut state = self.state.lock();
            match *state {
                BridgeState::Running => *state = BridgeState::Stopping,
                BridgeState::Starting => {
                    self.shared.abort.abort();
                    info!(bridge = %self.shared.name, "Stop requested while starting, aborting open");
                    let deadline = Instant::now() + timeout;
                    while *state == BridgeState::Starting {
                        if self.state_changed.wait_until(&mut state, deadline).timed_out() {
                            break;
                        }
                    }
                    if *state == BridgeState::Starting {
                        warn!(
                            bridge = %self.shared.name,
                            timeout_ms = self.shared.config.stop_timeout_ms,
                            "Driver still opening, it will be closed once open returns"
                        );
                    }
                    return Ok(());
                }
                other => {
                    debug!(bridge = %self.shared.name, state = ?other, "Stop ignored");
                    return Ok(());
                }
            }
        }
        let _entered = self.shared.span.enter();
        self.shared.running.store(false, Ordering::Release);

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if worker.exited.wait_timeout(timeout) {
                if worker.handle.join().is_err() {
                    warn!("Bridge loop terminated by panic");
                }
            } else {
                warn!(
                    timeout_ms = self.shared.config.stop_timeout_ms,
                    "Bridge loop did not exit in time, detaching"
                );
            }
        }

        match self.shared.driver.try_lock_for(timeout) {
            Some(mut driver) => driver.close(),
            None => warn!("Driver busy, skipped close"),
        }

        let mut state = self.state.lock();
        self.settle(&mut state, BridgeState::Stopped);
        info!("Bridge stopped");
        Ok(())
    }

    fn settle(&self, state: &mut BridgeState, next: BridgeState) {
        *state = next;
        self.state_changed.notify_all();
    }

    /// Queue one message for `key`. Never blocks on the link.
    pub fn send(&self, key: impl Into<RoutingKey>, message: D::Message) {
        let key = key.into();
        let mailbox = self.shared.outbox.get_or_create(&key);
        self.enqueue(&key, &mailbox, message);
    }

    /// Queue a burst of copies of `message` for `key`.
    ///
    /// Immediate bursts are all in the mailbox when this returns; copies
    /// beyond the mailbox capacity are counted as evicted without being
    /// queued. Spaced bursts enqueue the first copy now and the rest from
    /// the bridge's burst scheduler, one interval apart.
    pub fn send_burst(
        &self,
        key: impl Into<RoutingKey>,
        message: D::Message,
        burst: BurstSpec,
    ) -> Result<(), BusError> {
        let key = key.into();
        let mailbox = self.shared.outbox.get_or_create(&key);
        if burst.is_immediate() {
            let count = usize::try_from(burst.count()).unwrap_or(usize::MAX);
            let evicted = mailbox.put_copies(message, count);
            if evicted > 0 {
                debug!(bridge = %self.shared.name, key = %key, evicted, "Outbound mailbox full, oldest messages dropped");
            }
            return Ok(());
        }
        trace!(key = %key, count = burst.count(), "Scheduling spaced burst");
        self.bursts.schedule(&mailbox, message, burst)
    }

    fn enqueue(&self, key: &RoutingKey, mailbox: &BoundedMailbox<D::Message>, message: D::Message) {
        if mailbox.put(message).is_some() {
            debug!(bridge = %self.shared.name, key = %key, "Outbound mailbox full, oldest message dropped");
        }
    }

    /// Register a handler for inbound messages on `key`.
    pub fn register_handler<F>(
        &self,
        key: impl Into<RoutingKey>,
        handler: F,
        duplicate_window: Option<Duration>,
    ) -> HandlerId
    where
        F: Fn(&D::Message) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.shared.handlers.register(key, handler, duplicate_window)
    }

    /// Remove a registration. Unknown ids are ignored.
    pub fn unregister_handler(&self, key: &str, id: HandlerId) -> bool {
        self.shared.handlers.unregister(key, id)
    }

    #[must_use]
    pub fn has_handlers(&self, key: &str) -> bool {
        self.shared.handlers.contains_key(key)
    }

    #[must_use]
    pub fn handler_count(&self, key: &str) -> usize {
        self.shared.handlers.handler_count(key)
    }

    /// Take every message recorded under `key` since the last drain.
    pub fn drain_inbound(&self, key: &str) -> Vec<D::Message> {
        self.shared.inbox.drain(key)
    }

    #[must_use]
    pub fn inbound_len(&self, key: &str) -> usize {
        self.shared.inbox.len_of(key)
    }

    #[must_use]
    pub fn outbound_len(&self, key: &str) -> usize {
        self.shared.outbox.len_of(key)
    }

    /// Run one drain/write/read/dispatch cycle on the calling thread.
    ///
    /// For drivers stepped by hand while the bridge is stopped.
    pub fn poll_once(&self) {
        run_cycle(&self.shared);
    }

    #[must_use]
    pub fn stats(&self) -> BridgeStatsSnapshot {
        let stats = &self.shared.stats;
        BridgeStatsSnapshot {
            sent: stats.sent.load(Ordering::Relaxed),
            received: stats.received.load(Ordering::Relaxed),
            delivered: stats.delivered.load(Ordering::Relaxed),
            suppressed: stats.suppressed.load(Ordering::Relaxed),
            handler_failures: stats.handler_failures.load(Ordering::Relaxed),
            outbound_evicted: self.shared.outbox.evicted_total(),
            inbound_evicted: self.shared.inbox.evicted_total(),
            cycles: stats.cycles.load(Ordering::Relaxed),
        }
    }
}

impl<D: LinkDriver> Drop for BridgeRuntime<D> {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}

// =============================================================================
// I/O LOOP
// =============================================================================

fn run_loop<D: LinkDriver>(shared: &Shared<D>) {
    let _entered = shared.span.enter();
    debug!("Bridge loop started");
    while shared.running.load(Ordering::Acquire) {
        run_cycle(shared);
        thread::sleep(shared.config.loop_interval());
    }
    debug!("Bridge loop exited");
}

fn run_cycle<D: LinkDriver>(shared: &Shared<D>) {
    let pending = shared.outbox.drain_grouped();
    let inbound = {
        let mut driver = shared.driver.lock();
        if !pending.is_empty() {
            let count: usize = pending.values().map(Vec::len).sum();
            driver.write_once(pending);
            shared.stats.sent.fetch_add(count as u64, Ordering::Relaxed);
        }
        driver.read_once()
    };

    for (key, message) in inbound {
        shared.stats.received.fetch_add(1, Ordering::Relaxed);
        if shared.inbox.put(&key, message.clone()).is_some() {
            trace!(key = %key, "Inbound mailbox full, oldest message dropped");
        }
        let report = shared.handlers.dispatch(key.as_str(), &message);
        shared.stats.record_dispatch(report);
    }
    shared.stats.cycles.fetch_add(1, Ordering::Relaxed);
}
