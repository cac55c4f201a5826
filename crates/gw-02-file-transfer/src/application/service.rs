//! # File-Transfer Proxy
//!
//! Async surface over a [`TransferClient`]. Each operation is a job on the
//! worker pool; the caller's task only awaits. Download progress travels
//! back over a channel and the caller's callback runs on the caller's task.
//!
//! ```text
//! caller task                         worker thread
//!   download_with_progress ──submit──→ client.download(..)
//!   ←──── progress (mpsc) ──────────── session progress callback
//!   on_progress(f)
//!   ←──── result (oneshot) ─────────── DownloadOutcome
//! ```

use crate::application::client::{TransferClient, TransferStats, TransferStatsSnapshot};
use crate::application::worker::WorkerPool;
use crate::config::FileTransferConfig;
use crate::domain::{DownloadOutcome, LogIndex, LogInfo, RemoteClock};
use crate::ports::TransferConnector;
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{LinkEndpoint, Proxy, ProxyError, ProxyStatus};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, info_span, Span};

/// Name reported by [`Proxy::name`].
pub const PROXY_NAME: &str = "file_transfer";

type ClientSlot = Arc<Mutex<Option<TransferClient>>>;

pub struct FileTransferProxy {
    config: FileTransferConfig,
    endpoint: LinkEndpoint,
    connector: Arc<dyn TransferConnector>,
    pool: WorkerPool,
    /// Only ever locked on a worker thread.
    client: ClientSlot,
    status: Mutex<ProxyStatus>,
    stats: Arc<TransferStats>,
}

impl FileTransferProxy {
    pub fn new(
        config: FileTransferConfig,
        connector: Arc<dyn TransferConnector>,
    ) -> Result<Self, ProxyError> {
        let span = info_span!("file_transfer", endpoint = %config.endpoint);
        Self::with_span(config, connector, span)
    }

    /// Build a proxy whose workers log inside `span`.
    pub fn with_span(
        config: FileTransferConfig,
        connector: Arc<dyn TransferConnector>,
        span: Span,
    ) -> Result<Self, ProxyError> {
        let endpoint = config.validate()?;
        let pool = WorkerPool::new(PROXY_NAME, config.workers, span)?;
        Ok(Self {
            config,
            endpoint,
            connector,
            pool,
            client: Arc::new(Mutex::new(None)),
            status: Mutex::new(ProxyStatus::Stopped),
            stats: Arc::new(TransferStats::default()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &FileTransferConfig {
        &self.config
    }

    #[must_use]
    pub fn stats(&self) -> TransferStatsSnapshot {
        self.stats.snapshot()
    }

    fn set_status(&self, status: ProxyStatus) {
        *self.status.lock() = status;
    }

    /// Queue `job` against the connected client.
    fn submit<F, R>(&self, job: F) -> Result<oneshot::Receiver<Result<R, ProxyError>>, ProxyError>
    where
        F: FnOnce(&mut TransferClient) -> Result<R, ProxyError> + Send + 'static,
        R: Send + 'static,
    {
        if *self.status.lock() != ProxyStatus::Running {
            return Err(ProxyError::NotStarted(PROXY_NAME.into()));
        }
        let slot = Arc::clone(&self.client);
        self.pool.submit(move || match slot.lock().as_mut() {
            Some(client) => job(client),
            None => Err(ProxyError::NotStarted(PROXY_NAME.into())),
        })
    }

    async fn run<F, R>(&self, operation: &'static str, job: F) -> Result<R, ProxyError>
    where
        F: FnOnce(&mut TransferClient) -> Result<R, ProxyError> + Send + 'static,
        R: Send + 'static,
    {
        let result = self.submit(job)?;
        let outcome = result.await.unwrap_or_else(|_| Err(worker_lost(operation)));
        if let Err(err) = &outcome {
            error!(operation, kind = %err.kind(), error = %err, "Transfer operation failed");
        }
        outcome
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Logs under the configured base path, oldest first.
    pub async fn list_logs(&self) -> Result<Vec<LogInfo>, ProxyError> {
        let base = self.config.log_base_path.clone();
        self.list_logs_in(&base).await
    }

    /// Logs under `base`, oldest first.
    pub async fn list_logs_in(&self, base: &str) -> Result<Vec<LogInfo>, ProxyError> {
        let base = base.to_string();
        self.run("list_logs", move |client| client.list_logs(&base)).await
    }

    /// Log index fetched at connect.
    pub async fn log_index(&self) -> Result<LogIndex, ProxyError> {
        self.run("log_index", |client| Ok(client.index().clone())).await
    }

    /// Download without progress reporting. Returns the local path.
    pub async fn download(
        &self,
        remote_path: &str,
        local_path: impl AsRef<Path>,
    ) -> Result<PathBuf, ProxyError> {
        self.download_with_progress(remote_path, local_path, |_| {})
            .await
            .map(|outcome| outcome.local_path)
    }

    /// Download `remote_path` to `local_path`, calling `on_progress` with
    /// the completed fraction. `on_progress` runs on the calling task.
    pub async fn download_with_progress<P>(
        &self,
        remote_path: &str,
        local_path: impl AsRef<Path>,
        mut on_progress: P,
    ) -> Result<DownloadOutcome, ProxyError>
    where
        P: FnMut(f32) + Send,
    {
        if remote_path.trim().is_empty() {
            return Err(ProxyError::Validation("remote path is empty".into()));
        }
        let remote = remote_path.to_string();
        let local = local_path.as_ref().to_path_buf();
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<f32>();

        let mut result = self.submit(move |client| {
            client.download(&remote, &local, &mut |fraction| {
                let _ = progress_tx.send(fraction);
            })
        })?;

        let outcome = loop {
            tokio::select! {
                biased;
                Some(fraction) = progress_rx.recv() => on_progress(fraction),
                finished = &mut result => break finished,
            }
        };
        while let Ok(fraction) = progress_rx.try_recv() {
            on_progress(fraction);
        }

        let outcome = outcome.unwrap_or_else(|_| Err(worker_lost("download")));
        match &outcome {
            Ok(done) => debug!(
                remote = remote_path,
                size_bytes = done.size_bytes,
                recovered = done.recovered_from_staging,
                "Download finished"
            ),
            Err(err) => error!(remote = remote_path, kind = %err.kind(), error = %err, "Download failed"),
        }
        outcome
    }

    /// The vehicle's clock.
    pub async fn get_remote_clock(&self) -> Result<RemoteClock, ProxyError> {
        self.run("get_remote_clock", TransferClient::remote_clock).await
    }

    /// Remove `fail_*.log` files from `path`, or from the configured error
    /// log directory.
    pub async fn clear_error_logs(&self, path: Option<&str>) -> Result<Vec<String>, ProxyError> {
        let path = path.unwrap_or(&self.config.error_log_path).to_string();
        self.run("clear_error_logs", move |client| client.clear_error_logs(&path))
            .await
    }
}

fn worker_lost(operation: &str) -> ProxyError {
    ProxyError::Transport(format!("{operation}: transfer worker dropped the job"))
}

#[async_trait]
impl Proxy for FileTransferProxy {
    fn name(&self) -> &'static str {
        PROXY_NAME
    }

    async fn start(&self) -> Result<(), ProxyError> {
        {
            let mut status = self.status.lock();
            if *status == ProxyStatus::Running {
                return Ok(());
            }
            *status = ProxyStatus::Starting;
        }

        let endpoint = self.endpoint.clone();
        let connector = Arc::clone(&self.connector);
        let config = self.config.clone();
        let stats = Arc::clone(&self.stats);
        let slot = Arc::clone(&self.client);
        let connected = self
            .pool
            .run(move || {
                let client = TransferClient::connect(endpoint, connector, config, stats)?;
                let summary = (client.system_id(), client.index().len());
                *slot.lock() = Some(client);
                Ok::<_, ProxyError>(summary)
            })
            .await;
        let connected = match connected {
            Ok(inner) => inner,
            Err(err) => Err(err),
        };

        match connected {
            Ok((system_id, logs)) => {
                self.set_status(ProxyStatus::Running);
                info!(system_id, logs, "File-transfer proxy started");
                Ok(())
            }
            Err(err) => {
                self.set_status(ProxyStatus::Failed);
                error!(error = %err, "File-transfer proxy failed to start");
                Err(err)
            }
        }
    }

    async fn stop(&self) -> Result<(), ProxyError> {
        self.set_status(ProxyStatus::Stopping);
        let slot = Arc::clone(&self.client);
        let closed = self
            .pool
            .run(move || {
                if let Some(mut client) = slot.lock().take() {
                    client.close();
                }
            })
            .await;
        self.set_status(ProxyStatus::Stopped);
        info!("File-transfer proxy stopped");
        closed
    }

    fn status(&self) -> ProxyStatus {
        *self.status.lock()
    }
}
