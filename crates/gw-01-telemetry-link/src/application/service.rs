//! # Telemetry Link Proxy
//!
//! Caller-facing surface of the telemetry link. Sends are queued on the
//! generic key; handlers subscribe to any of the three inbound keys.
//!
//! ## Request/Reply
//!
//! ```text
//! caller                    proxy                        vehicle
//!   │ send_and_wait(key) ──→ register one-shot handler
//!   │                        enqueue request ─────────→
//!   │                        ←───────────────────────── reply on key
//!   │                        collector(reply) == true
//!   │ ←── Ok(()) ─────────── unregister handler
//! ```
//!
//! The handler is registered before the request is queued, so a reply that
//! arrives on the very next I/O cycle is never missed.

use crate::application::driver::TelemetryLinkDriver;
use crate::config::TelemetryLinkConfig;
use crate::domain::{generic_key, GENERIC_KEY};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use shared_bus::{
    BridgeRuntime, BridgeStatsSnapshot, BurstSpec, HandlerError, HandlerId, Latch, MAX_BURST_COUNT,
};
use shared_types::{
    msg_ids, requests, LinkConnector, LinkMessage, LinkTarget, Proxy, ProxyError, ProxyStatus,
    RoutingKey,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, info_span, Span};

/// Name reported by [`Proxy::name`].
pub const PROXY_NAME: &str = "telemetry_link";

/// Proxy over the vehicle's telemetry link.
pub struct TelemetryLinkProxy {
    bridge: Arc<BridgeRuntime<TelemetryLinkDriver>>,
    target: Arc<RwLock<Option<LinkTarget>>>,
    config: TelemetryLinkConfig,
}

impl TelemetryLinkProxy {
    /// Build a proxy. The link is not opened until `start`.
    pub fn new(config: TelemetryLinkConfig, connector: Arc<dyn LinkConnector>) -> Result<Self, ProxyError> {
        let span = info_span!("telemetry_link", endpoint = %config.endpoint);
        Self::with_span(config, connector, span)
    }

    /// Build a proxy whose threads log inside `span`.
    pub fn with_span(
        config: TelemetryLinkConfig,
        connector: Arc<dyn LinkConnector>,
        span: Span,
    ) -> Result<Self, ProxyError> {
        let endpoint = config.parse_endpoint()?;
        if config.heartbeat_attempts == Some(0) {
            return Err(ProxyError::Validation(
                "heartbeat_attempts must be at least 1".into(),
            ));
        }
        let driver = TelemetryLinkDriver::new(
            endpoint,
            connector,
            config.heartbeat_timeout(),
            config.heartbeat_attempts,
        )
        .with_debug(config.debug);
        let target = driver.target_handle();
        let bridge = BridgeRuntime::with_span(driver, config.bridge_config(), span);
        Ok(Self {
            bridge: Arc::new(bridge),
            target,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &TelemetryLinkConfig {
        &self.config
    }

    /// Start on the calling thread. Blocks until the heartbeat arrives or
    /// the configured attempts run out.
    pub fn start_blocking(&self) -> Result<(), ProxyError> {
        self.bridge.start().map_err(ProxyError::from)
    }

    pub fn stop_blocking(&self) -> Result<(), ProxyError> {
        self.bridge.stop().map_err(ProxyError::from)
    }

    /// Vehicle addressing learned from its heartbeat.
    #[must_use]
    pub fn target(&self) -> Option<LinkTarget> {
        *self.target.read()
    }

    /// Queue a message for transmission.
    pub fn send(&self, message: LinkMessage) {
        self.bridge.send(generic_key(), message);
    }

    /// Queue a message on an explicit key. Only the generic key is
    /// transmitted by this link.
    pub fn send_on(&self, key: impl Into<RoutingKey>, message: LinkMessage) {
        self.bridge.send(key, message);
    }

    /// Queue `burst_count` copies of `message`, optionally spaced by
    /// `burst_interval`. Counts above [`MAX_BURST_COUNT`] are rejected.
    pub fn send_burst(
        &self,
        message: LinkMessage,
        burst_count: u32,
        burst_interval: Option<Duration>,
    ) -> Result<(), ProxyError> {
        if burst_count > MAX_BURST_COUNT {
            return Err(ProxyError::Validation(format!(
                "burst_count {burst_count} exceeds {MAX_BURST_COUNT}"
            )));
        }
        self.bridge
            .send_burst(
                generic_key(),
                message,
                BurstSpec::new(burst_count, burst_interval),
            )
            .map_err(ProxyError::from)
    }

    /// Subscribe to inbound traffic on `key` (numeric id, type name, or the
    /// generic key).
    pub fn register_handler<F>(
        &self,
        key: impl Into<RoutingKey>,
        handler: F,
        duplicate_window: Option<Duration>,
    ) -> HandlerId
    where
        F: Fn(&LinkMessage) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.bridge.register_handler(key, handler, duplicate_window)
    }

    pub fn unregister_handler(&self, key: &str, id: HandlerId) -> bool {
        self.bridge.unregister_handler(key, id)
    }

    #[must_use]
    pub fn has_handlers(&self, key: &str) -> bool {
        self.bridge.has_handlers(key)
    }

    /// Take every message received on `key` since the last drain.
    pub fn drain_inbound(&self, key: &str) -> Vec<LinkMessage> {
        self.bridge.drain_inbound(key)
    }

    #[must_use]
    pub fn stats(&self) -> BridgeStatsSnapshot {
        self.bridge.stats()
    }

    fn require_target(&self) -> Result<LinkTarget, ProxyError> {
        self.target()
            .ok_or_else(|| ProxyError::NotStarted(PROXY_NAME.into()))
    }

    /// Ask the vehicle to emit the message with `message_id` once. Returns
    /// the queued command.
    pub fn request_message(&self, message_id: u32) -> Result<LinkMessage, ProxyError> {
        let request = requests::request_message(self.require_target()?, message_id);
        self.send(request.clone());
        Ok(request)
    }

    /// Ask the vehicle for its full log index. Returns the queued request.
    pub fn log_request_list(&self) -> Result<LinkMessage, ProxyError> {
        let request = requests::log_request_list(self.require_target()?);
        self.send(request.clone());
        Ok(request)
    }

    /// Send `request`, then block until `collector` returns `true` for a
    /// message on `match_key`, or `timeout` elapses.
    ///
    /// Must not be called from the thread running the async scheduler; use
    /// [`send_and_wait_async`](Self::send_and_wait_async) there.
    pub fn send_and_wait<C>(
        &self,
        match_key: &str,
        request: LinkMessage,
        collector: C,
        timeout: Duration,
    ) -> Result<(), ProxyError>
    where
        C: FnMut(&LinkMessage) -> bool + Send + 'static,
    {
        let done = Arc::new(Latch::new());
        let signal = Arc::clone(&done);
        let collector = Mutex::new(collector);
        let id = self.register_handler(
            match_key,
            move |message: &LinkMessage| {
                if signal.is_set() {
                    return Ok(());
                }
                let mut collect = collector.lock();
                if (*collect)(message) {
                    signal.set();
                }
                Ok(())
            },
            None,
        );
        self.send(request);
        let completed = done.wait_timeout(timeout);
        self.unregister_handler(match_key, id);
        finish_wait(match_key, completed, timeout)
    }

    /// Async form of [`send_and_wait`](Self::send_and_wait). The wait yields
    /// to the scheduler instead of blocking its thread.
    pub async fn send_and_wait_async<C>(
        &self,
        match_key: &str,
        request: LinkMessage,
        collector: C,
        timeout: Duration,
    ) -> Result<(), ProxyError>
    where
        C: FnMut(&LinkMessage) -> bool + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<()>();
        let slot = Mutex::new(Some(tx));
        let collector = Mutex::new(collector);
        let id = self.register_handler(
            match_key,
            move |message: &LinkMessage| {
                let mut slot = slot.lock();
                if slot.is_none() {
                    return Ok(());
                }
                let mut collect = collector.lock();
                if (*collect)(message) {
                    if let Some(tx) = slot.take() {
                        let _ = tx.send(());
                    }
                }
                Ok(())
            },
            None,
        );
        self.send(request);
        let completed = matches!(tokio::time::timeout(timeout, rx).await, Ok(Ok(())));
        self.unregister_handler(match_key, id);
        finish_wait(match_key, completed, timeout)
    }

    /// Request a message by id and wait for it, returning the first reply.
    pub async fn request_and_collect(
        &self,
        message_id: u32,
        timeout: Duration,
    ) -> Result<LinkMessage, ProxyError> {
        let request = requests::request_message(self.require_target()?, message_id);
        let reply: Arc<Mutex<Option<LinkMessage>>> = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&reply);
        let key = RoutingKey::numeric(message_id);
        self.send_and_wait_async(
            key.as_str(),
            request,
            move |message| {
                *sink.lock() = Some(message.clone());
                true
            },
            timeout,
        )
        .await?;
        let reply = reply.lock().take();
        reply.ok_or_else(|| ProxyError::timeout(key.to_string(), timeout))
    }
}

fn finish_wait(match_key: &str, completed: bool, timeout: Duration) -> Result<(), ProxyError> {
    if completed {
        debug!(key = match_key, "Reply collected");
        Ok(())
    } else {
        debug!(key = match_key, timeout_ms = timeout.as_millis() as u64, "Reply wait timed out");
        Err(ProxyError::timeout(match_key, timeout))
    }
}

#[async_trait]
impl Proxy for TelemetryLinkProxy {
    fn name(&self) -> &'static str {
        PROXY_NAME
    }

    async fn start(&self) -> Result<(), ProxyError> {
        let bridge = Arc::clone(&self.bridge);
        let outcome = tokio::task::spawn_blocking(move || bridge.start())
            .await
            .map_err(|e| ProxyError::Transport(format!("start task failed: {e}")))?;
        outcome.map_err(ProxyError::from)?;
        info!(
            target_system = ?self.target().map(|t| t.system_id),
            heartbeat_id = msg_ids::HEARTBEAT,
            generic_key = GENERIC_KEY,
            "Telemetry link proxy started"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<(), ProxyError> {
        let bridge = Arc::clone(&self.bridge);
        tokio::task::spawn_blocking(move || bridge.stop())
            .await
            .map_err(|e| ProxyError::Transport(format!("stop task failed: {e}")))?
            .map_err(ProxyError::from)
    }

    fn status(&self) -> ProxyStatus {
        self.bridge.state().into()
    }
}
