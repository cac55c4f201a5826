//! # Transfer Client
//!
//! Blocking front end of one transfer channel. Every method blocks the
//! calling thread and is meant to be called from the proxy's worker.
//!
//! On connect the client waits for the vehicle heartbeat and fetches the
//! log index once. [`TransferClient::reconnect`] rebuilds only the
//! channel; the index is kept.

use crate::config::FileTransferConfig;
use crate::domain::{
    extract_remote_clock, match_files_to_index, sorted_log_infos, DirEntry, DownloadOutcome,
    LogEntryMeta, LogIndex, LogInfo, RemoteClock, RemoteFile, TransferError,
};
use crate::ports::{TransferChannel, TransferConnector};
use serde::{Deserialize, Serialize};
use shared_types::link::HEARTBEAT_POLL_INTERVAL;
use shared_types::{
    msg_ids, requests, unix_now_secs, LinkEndpoint, LinkMessage, LinkTarget, ProxyError,
};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// =============================================================================
// STATS
// =============================================================================

/// Counters shared between the client and its proxy.
#[derive(Debug, Default)]
pub struct TransferStats {
    ls_retries: AtomicU64,
    reconnects: AtomicU64,
    downloads: AtomicU64,
    bytes_downloaded: AtomicU64,
    staging_recoveries: AtomicU64,
    removed_error_logs: AtomicU64,
}

/// Point-in-time copy of [`TransferStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStatsSnapshot {
    pub ls_retries: u64,
    pub reconnects: u64,
    pub downloads: u64,
    pub bytes_downloaded: u64,
    pub staging_recoveries: u64,
    pub removed_error_logs: u64,
}

impl TransferStats {
    #[must_use]
    pub fn snapshot(&self) -> TransferStatsSnapshot {
        TransferStatsSnapshot {
            ls_retries: self.ls_retries.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            downloads: self.downloads.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            staging_recoveries: self.staging_recoveries.load(Ordering::Relaxed),
            removed_error_logs: self.removed_error_logs.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct TransferClient {
    endpoint: LinkEndpoint,
    connector: Arc<dyn TransferConnector>,
    config: FileTransferConfig,
    channel: Option<TransferChannel>,
    target: LinkTarget,
    index: LogIndex,
    stats: Arc<TransferStats>,
}

impl std::fmt::Debug for TransferClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferClient")
            .field("endpoint", &self.endpoint)
            .field("target", &self.target)
            .field("index_len", &self.index.len())
            .field("connected", &self.channel.is_some())
            .finish()
    }
}

impl TransferClient {
    /// Open the channel, wait for the heartbeat and fetch the log index.
    ///
    /// # Errors
    ///
    /// `Timeout` when no heartbeat arrives or the index request goes
    /// unanswered; `Transport` when the channel cannot be opened.
    pub fn connect(
        endpoint: LinkEndpoint,
        connector: Arc<dyn TransferConnector>,
        config: FileTransferConfig,
        stats: Arc<TransferStats>,
    ) -> Result<Self, ProxyError> {
        let (channel, target) = open_channel(&endpoint, connector.as_ref(), &config)?;
        let mut client = Self {
            endpoint,
            connector,
            config,
            channel: Some(channel),
            target,
            index: LogIndex::new(),
            stats,
        };
        match client.fetch_index() {
            Ok(index) => client.index = index,
            Err(err) => {
                client.close();
                return Err(err);
            }
        }
        info!(
            system_id = client.target.system_id,
            logs = client.index.len(),
            "Transfer link connected"
        );
        Ok(client)
    }

    #[must_use]
    pub fn system_id(&self) -> u8 {
        self.target.system_id
    }

    #[must_use]
    pub fn target(&self) -> LinkTarget {
        self.target
    }

    #[must_use]
    pub fn index(&self) -> &LogIndex {
        &self.index
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Tear down and reopen the channel, keeping the fetched index.
    pub fn reconnect(&mut self) -> Result<(), ProxyError> {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        self.stats.reconnects.fetch_add(1, Ordering::Relaxed);
        let (channel, target) = open_channel(&self.endpoint, self.connector.as_ref(), &self.config)?;
        self.channel = Some(channel);
        self.target = target;
        info!(endpoint = %self.endpoint, "Transfer link reconnected");
        Ok(())
    }

    pub fn close(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
            info!(endpoint = %self.endpoint, "Transfer link closed");
        }
    }

    fn channel_mut(&mut self) -> Result<&mut TransferChannel, ProxyError> {
        self.channel
            .as_mut()
            .ok_or_else(|| ProxyError::Transport("transfer link is not connected".into()))
    }

    // -------------------------------------------------------------------------
    // Log index
    // -------------------------------------------------------------------------

    fn fetch_index(&mut self) -> Result<LogIndex, ProxyError> {
        let timeout = self.config.index_timeout();
        let request = requests::log_request_list(self.target);
        self.channel_mut()?.link.send(&request)?;

        let mut index = LogIndex::new();
        let mut expected: Option<u64> = None;
        self.poll_link(timeout, |message| {
            if message.msg_id != msg_ids::LOG_ENTRY {
                return false;
            }
            let num_logs = message.field_u64("num_logs").unwrap_or(0);
            expected = Some(num_logs);
            if num_logs == 0 {
                return true;
            }
            if let Some(entry) = log_entry_meta(message) {
                index.insert(entry.id, entry);
            }
            index.len() as u64 >= num_logs
        })?;

        match expected {
            None => Err(ProxyError::timeout("log index", timeout)),
            Some(num_logs) => {
                if (index.len() as u64) < num_logs {
                    warn!(
                        received = index.len(),
                        expected = num_logs,
                        "Log index incomplete, keeping partial index"
                    );
                }
                debug!(entries = index.len(), "Log index fetched");
                Ok(index)
            }
        }
    }

    /// Feed inbound messages to `accept` until it returns `true` or
    /// `timeout` elapses. Returns whether `accept` was satisfied.
    fn poll_link<F>(&mut self, timeout: Duration, mut accept: F) -> Result<bool, ProxyError>
    where
        F: FnMut(&LinkMessage) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let link = &mut self.channel_mut()?.link;
        loop {
            match link.try_recv()? {
                Some(message) => {
                    if accept(&message) {
                        return Ok(true);
                    }
                }
                None if Instant::now() >= deadline => return Ok(false),
                None => std::thread::sleep(HEARTBEAT_POLL_INTERVAL),
            }
        }
    }

    // -------------------------------------------------------------------------
    // Listing
    // -------------------------------------------------------------------------

    /// List `path`, retrying with a reconnect between failed attempts.
    /// Duplicate rows are dropped; first-seen order is kept.
    ///
    /// # Errors
    ///
    /// [`ProxyError::ExhaustedRetries`] once every attempt has failed.
    pub fn ls(&mut self, path: &str) -> Result<Vec<DirEntry>, ProxyError> {
        let attempts = self.config.ls_retries.max(1);
        for attempt in 1..=attempts {
            let listed = match self.channel.as_mut() {
                Some(channel) => channel.session.list(path).map_err(ProxyError::from),
                None => Err(ProxyError::Transport("transfer link is not connected".into())),
            };
            match listed {
                Ok(rows) => {
                    let mut seen = BTreeSet::new();
                    return Ok(rows.into_iter().filter(|row| seen.insert(row.clone())).collect());
                }
                Err(err) => {
                    warn!(path, attempt, attempts, error = %err, "Directory listing failed");
                    if attempt == attempts {
                        break;
                    }
                    self.stats.ls_retries.fetch_add(1, Ordering::Relaxed);
                    std::thread::sleep(self.config.ls_retry_delay());
                    if let Err(err) = self.reconnect() {
                        warn!(path, attempt, error = %err, "Reconnect after failed listing failed");
                    }
                }
            }
        }
        Err(ProxyError::ExhaustedRetries {
            operation: format!("ls('{path}')"),
            attempts,
        })
    }

    /// Every log file under `base`, one directory level deep.
    pub fn walk_logs(&mut self, base: &str) -> Result<Vec<RemoteFile>, ProxyError> {
        let base = base.trim_end_matches('/');
        let suffix = self.config.log_suffix.clone();
        let mut files = Vec::new();
        for day in self.ls(base)? {
            if !day.is_dir || day.is_navigation() {
                continue;
            }
            let day_path = format!("{base}/{}", day.name);
            for row in self.ls(&day_path)? {
                if !row.is_dir && row.name.ends_with(&suffix) {
                    files.push(RemoteFile {
                        path: format!("{day_path}/{}", row.name),
                        size_bytes: row.size_bytes,
                    });
                }
            }
        }
        Ok(files)
    }

    /// Logs under `base` joined to the index, oldest first.
    ///
    /// # Errors
    ///
    /// [`ProxyError::CountMismatch`] when the listing and the index
    /// disagree on how many logs exist.
    pub fn list_logs(&mut self, base: &str) -> Result<Vec<LogInfo>, ProxyError> {
        let files = self.walk_logs(base)?;
        if files.is_empty() {
            debug!(base, "No log files found");
            return Ok(Vec::new());
        }
        let mapping = match_files_to_index(&files, &self.index, self.config.size_tolerance_bytes)?;
        Ok(sorted_log_infos(mapping))
    }

    // -------------------------------------------------------------------------
    // Download
    // -------------------------------------------------------------------------

    /// Fetch `remote_path` into `local_path`.
    ///
    /// When the session reports success but `local_path` is missing, the
    /// session's staging file is moved into place.
    pub fn download(
        &mut self,
        remote_path: &str,
        local_path: &Path,
        progress: &mut dyn FnMut(f32),
    ) -> Result<DownloadOutcome, ProxyError> {
        info!(remote = remote_path, local = %local_path.display(), "Downloading");
        if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(TransferError::from)?;
        }

        let channel = self.channel_mut()?;
        channel
            .session
            .get(remote_path, local_path, progress)
            .map_err(|err| match err {
                TransferError::Nack { code, .. } => {
                    ProxyError::Transport(format!("OpenFileRO failed: {code}"))
                }
                other => other.into(),
            })?;

        let mut recovered = false;
        if !local_path.exists() {
            let staging = channel
                .session
                .staging_path()
                .filter(|p| p.exists())
                .ok_or_else(|| {
                    ProxyError::Transport(format!(
                        "{remote_path} reported complete but {} is missing",
                        local_path.display()
                    ))
                })?;
            move_file(&staging, local_path).map_err(TransferError::from)?;
            recovered = true;
            self.stats.staging_recoveries.fetch_add(1, Ordering::Relaxed);
            warn!(local = %local_path.display(), "Staging file recovered");
        }

        let size_bytes = fs::metadata(local_path).map_err(TransferError::from)?.len();
        self.stats.downloads.fetch_add(1, Ordering::Relaxed);
        self.stats.bytes_downloaded.fetch_add(size_bytes, Ordering::Relaxed);
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!("Saved {} ({:.1} KiB)", name, size_bytes as f64 / 1024.0);

        Ok(DownloadOutcome {
            local_path: local_path.to_path_buf(),
            size_bytes,
            recovered_from_staging: recovered,
        })
    }

    // -------------------------------------------------------------------------
    // Clock and cleanup
    // -------------------------------------------------------------------------

    /// Ask the vehicle for its clock message and resolve it.
    pub fn remote_clock(&mut self) -> Result<RemoteClock, ProxyError> {
        let message_id = self.config.clock_message_id;
        let timeout = self.config.clock_timeout();
        let request = requests::request_message(self.target, message_id);
        self.channel_mut()?.link.send(&request)?;

        let mut reply = None;
        self.poll_link(timeout, |message| {
            if message.msg_id == message_id {
                reply = Some(message.clone());
                return true;
            }
            false
        })?;
        let reply = reply.ok_or_else(|| ProxyError::timeout("remote clock", timeout))?;
        extract_remote_clock(&reply, unix_now_secs())
    }

    /// Remove every `fail_*.log` in `path`. Returns the removed paths.
    pub fn clear_error_logs(&mut self, path: &str) -> Result<Vec<String>, ProxyError> {
        let path = path.trim_end_matches('/');
        let mut removed = Vec::new();
        for row in self.ls(path)? {
            if row.is_dir || !is_error_log(&row.name) {
                continue;
            }
            let remote = format!("{path}/{}", row.name);
            self.channel_mut()?.session.remove(&remote)?;
            info!(remote = %remote, "Error log removed");
            removed.push(remote);
        }
        self.stats
            .removed_error_logs
            .fetch_add(removed.len() as u64, Ordering::Relaxed);
        Ok(removed)
    }
}

impl Drop for TransferClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_channel(
    endpoint: &LinkEndpoint,
    connector: &dyn TransferConnector,
    config: &FileTransferConfig,
) -> Result<(TransferChannel, LinkTarget), ProxyError> {
    let mut channel = connector.connect(endpoint, &config.settings())?;
    let timeout = config.heartbeat_timeout();
    match channel.link.wait_heartbeat(timeout) {
        Ok(Some(heartbeat)) => {
            debug!(
                system_id = heartbeat.source.system_id,
                component_id = heartbeat.source.component_id,
                "Heartbeat from vehicle"
            );
            Ok((channel, heartbeat.source))
        }
        Ok(None) => {
            channel.close();
            Err(ProxyError::timeout("heartbeat", timeout))
        }
        Err(err) => {
            channel.close();
            Err(err.into())
        }
    }
}

fn log_entry_meta(message: &LinkMessage) -> Option<LogEntryMeta> {
    Some(LogEntryMeta {
        id: u32::try_from(message.field_u64("id")?).ok()?,
        size_bytes: message.field_u64("size").unwrap_or(0),
        utc_seconds: message.field_u64("time_utc").unwrap_or(0),
    })
}

fn is_error_log(name: &str) -> bool {
    name.starts_with("fail_") && name.ends_with(".log")
}

fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}
