//! # Simulated Vehicle
//!
//! In-process vehicle with an in-memory filesystem and log index. It serves
//! both link connectors (telemetry) and transfer connectors (files), and
//! answers `LOG_REQUEST_LIST` and clock requests on every link it opens.
//!
//! Each `connect` opens a fresh loopback link and queues one heartbeat on
//! it. Failure injection covers listing errors, refused opens and sessions
//! that leave downloads in their staging file.

use crate::domain::{DirEntry, LogEntryMeta, TransferError};
use crate::ports::{TransferChannel, TransferConnector, TransferSession, TransferSettings};
use parking_lot::Mutex;
use serde_json::Value;
use shared_types::link::loopback::{LoopbackHandle, LoopbackLink};
use shared_types::{
    msg_ids, msg_types, requests, LinkConnection, LinkConnector, LinkEndpoint, LinkError,
    LinkMessage, LinkTarget,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Return code for a missing remote path.
pub const NACK_FILE_NOT_FOUND: u8 = 10;

/// Return code for a generic failure.
pub const NACK_FAIL: u8 = 1;

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Default)]
struct VehicleState {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, u64>,
    index: BTreeMap<u32, LogEntryMeta>,
    clock_fields: Option<BTreeMap<String, Value>>,
    list_failures: HashMap<String, u32>,
    list_calls: HashMap<String, u32>,
    duplicate_listings: bool,
    open_failure: Option<u8>,
    staging_only: bool,
    removed: Vec<String>,
    last_settings: Option<TransferSettings>,
}

/// Simulated vehicle. Clones share the same vehicle.
#[derive(Clone)]
pub struct SimulatedVehicle {
    target: LinkTarget,
    state: Arc<Mutex<VehicleState>>,
    links: Arc<Mutex<Vec<LoopbackHandle>>>,
}

impl Default for SimulatedVehicle {
    fn default() -> Self {
        Self::new(LinkTarget::new(1, 1))
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

fn base_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

impl SimulatedVehicle {
    pub fn new(target: LinkTarget) -> Self {
        Self {
            target,
            state: Arc::new(Mutex::new(VehicleState::default())),
            links: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A vehicle preloaded with two days of logs, one error log and a clock.
    pub fn demo() -> Self {
        let vehicle = Self::default();
        vehicle.add_log(0, "fs/microsd/log/2024-05-01/09_12_44.log", 182_304, 1_714_554_764);
        vehicle.add_log(1, "fs/microsd/log/2024-05-01/14_03_10.log", 96_112, 1_714_572_190);
        vehicle.add_log(2, "fs/microsd/log/2024-05-02/08_45_00.log", 401_920, 1_714_639_500);
        vehicle.add_file("fs/microsd/fail_001.log", 512);
        vehicle.set_clock_fields([("time_boot_ms".to_string(), Value::from(60_000))]);
        vehicle
    }

    #[must_use]
    pub fn target(&self) -> LinkTarget {
        self.target
    }

    /// Create a directory and its ancestors.
    pub fn add_dir(&self, path: &str) {
        let mut state = self.state.lock();
        let mut current = normalize(path);
        while !current.is_empty() {
            let parent = parent_of(&current).to_string();
            state.dirs.insert(current);
            current = parent;
        }
    }

    /// Create a file of `size_bytes`, creating its directories.
    pub fn add_file(&self, path: &str, size_bytes: u64) {
        let path = normalize(path);
        self.add_dir(parent_of(&path));
        self.state.lock().files.insert(path, size_bytes);
    }

    /// Add an index entry without a matching file.
    pub fn add_index_entry(&self, id: u32, size_bytes: u64, utc_seconds: u64) {
        self.state.lock().index.insert(
            id,
            LogEntryMeta {
                id,
                size_bytes,
                utc_seconds,
            },
        );
    }

    /// Add a log file and its index entry.
    pub fn add_log(&self, id: u32, path: &str, size_bytes: u64, utc_seconds: u64) {
        self.add_file(path, size_bytes);
        self.add_index_entry(id, size_bytes, utc_seconds);
    }

    /// Fields of the clock reply. Without them clock requests go unanswered.
    pub fn set_clock_fields<I>(&self, fields: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.state.lock().clock_fields = Some(fields.into_iter().collect());
    }

    pub fn clear_clock(&self) {
        self.state.lock().clock_fields = None;
    }

    /// Make the next `times` listings of `path` fail.
    pub fn fail_listing(&self, path: &str, times: u32) {
        self.state
            .lock()
            .list_failures
            .insert(normalize(path), times);
    }

    /// Return every listing row twice.
    pub fn set_duplicate_listings(&self, duplicate: bool) {
        self.state.lock().duplicate_listings = duplicate;
    }

    /// Refuse file opens with `code`, or accept them again with `None`.
    pub fn set_open_failure(&self, code: Option<u8>) {
        self.state.lock().open_failure = code;
    }

    /// Leave downloaded data in the session's staging file.
    pub fn set_staging_only(&self, staging_only: bool) {
        self.state.lock().staging_only = staging_only;
    }

    /// How many times `path` was listed, failures included.
    #[must_use]
    pub fn list_calls(&self, path: &str) -> u32 {
        self.state
            .lock()
            .list_calls
            .get(&normalize(path))
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn removed(&self) -> Vec<String> {
        self.state.lock().removed.clone()
    }

    #[must_use]
    pub fn has_file(&self, path: &str) -> bool {
        self.state.lock().files.contains_key(&normalize(path))
    }

    #[must_use]
    pub fn last_settings(&self) -> Option<TransferSettings> {
        self.state.lock().last_settings
    }

    /// Links opened so far, oldest first.
    #[must_use]
    pub fn links(&self) -> Vec<LoopbackHandle> {
        self.links.lock().clone()
    }

    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.links.lock().len()
    }

    /// Queue `message` on every link opened so far.
    pub fn broadcast(&self, message: &LinkMessage) {
        for link in self.links.lock().iter() {
            link.inject(message.clone());
        }
    }

    fn open_link(&self, endpoint: &LinkEndpoint) -> LoopbackLink {
        let handle = LoopbackHandle::new();
        let state = Arc::clone(&self.state);
        let target = self.target;
        handle.respond_with(move |message| respond(&state, target, message));
        handle.inject_heartbeat(target);
        let link = handle.open(endpoint.clone());
        self.links.lock().push(handle);
        debug!(endpoint = %endpoint, system_id = target.system_id, "Simulated link opened");
        link
    }
}

/// Replies the vehicle produces for one message sent by the gateway.
fn respond(state: &Mutex<VehicleState>, target: LinkTarget, message: &LinkMessage) -> Vec<LinkMessage> {
    if message.msg_id == msg_ids::LOG_REQUEST_LIST {
        let state = state.lock();
        let num_logs = state.index.len();
        if num_logs == 0 {
            return vec![log_entry(target, 0, 0, 0, 0)];
        }
        return state
            .index
            .values()
            .map(|e| log_entry(target, e.id, num_logs, e.size_bytes, e.utc_seconds))
            .collect();
    }
    let (msg_id, reply_type) = match requests::requested_message_id(message) {
        Some(msg_ids::AUTOPILOT_VERSION) => (msg_ids::AUTOPILOT_VERSION, msg_types::AUTOPILOT_VERSION),
        Some(msg_ids::SYSTEM_TIME) => (msg_ids::SYSTEM_TIME, msg_types::SYSTEM_TIME),
        _ => return Vec::new(),
    };
    let state = state.lock();
    let Some(fields) = &state.clock_fields else {
        return Vec::new();
    };
    let mut reply = LinkMessage::new(msg_id, reply_type).with_source(target);
    reply.fields = fields.clone();
    vec![reply]
}

fn log_entry(target: LinkTarget, id: u32, num_logs: usize, size: u64, utc: u64) -> LinkMessage {
    LinkMessage::new(msg_ids::LOG_ENTRY, msg_types::LOG_ENTRY)
        .with_source(target)
        .with_field("id", id)
        .with_field("num_logs", num_logs)
        .with_field("last_log_num", num_logs.saturating_sub(1))
        .with_field("size", size)
        .with_field("time_utc", utc)
}

impl LinkConnector for SimulatedVehicle {
    fn connect(&self, endpoint: &LinkEndpoint) -> Result<Box<dyn LinkConnection>, LinkError> {
        Ok(Box::new(self.open_link(endpoint)))
    }
}

impl TransferConnector for SimulatedVehicle {
    fn connect(
        &self,
        endpoint: &LinkEndpoint,
        settings: &TransferSettings,
    ) -> Result<TransferChannel, TransferError> {
        self.state.lock().last_settings = Some(*settings);
        let link = self.open_link(endpoint);
        let staging = std::env::temp_dir().join(format!(
            "gw-sim-{}-{}.part",
            std::process::id(),
            STAGING_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        Ok(TransferChannel {
            link: Box::new(link),
            session: Box::new(SimSession {
                state: Arc::clone(&self.state),
                staging,
                chunk: usize::from(settings.burst_read_size.max(1)),
                closed: false,
            }),
        })
    }
}

struct SimSession {
    state: Arc<Mutex<VehicleState>>,
    staging: PathBuf,
    chunk: usize,
    closed: bool,
}

impl SimSession {
    fn ensure_open(&self, operation: &str) -> Result<(), TransferError> {
        if self.closed {
            return Err(TransferError::Nack {
                operation: operation.to_string(),
                code: NACK_FAIL,
            });
        }
        Ok(())
    }
}

impl TransferSession for SimSession {
    fn list(&mut self, path: &str) -> Result<Vec<DirEntry>, TransferError> {
        self.ensure_open("ListDirectory")?;
        let path = normalize(path);
        let mut state = self.state.lock();
        *state.list_calls.entry(path.clone()).or_default() += 1;

        if let Some(remaining) = state.list_failures.get_mut(&path) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TransferError::Nack {
                    operation: "ListDirectory".into(),
                    code: NACK_FAIL,
                });
            }
        }
        if !state.dirs.contains(&path) {
            return Err(TransferError::Nack {
                operation: "ListDirectory".into(),
                code: NACK_FILE_NOT_FOUND,
            });
        }

        let mut rows: Vec<DirEntry> = state
            .dirs
            .iter()
            .filter(|dir| parent_of(dir) == path)
            .map(|dir| DirEntry::dir(base_name(dir)))
            .chain(
                state
                    .files
                    .iter()
                    .filter(|(file, _)| parent_of(file) == path)
                    .map(|(file, size)| DirEntry::file(base_name(file), *size)),
            )
            .collect();
        if state.duplicate_listings {
            let copy = rows.clone();
            rows.extend(copy);
        }
        Ok(rows)
    }

    fn get(
        &mut self,
        remote_path: &str,
        local_path: &Path,
        progress: &mut dyn FnMut(f32),
    ) -> Result<(), TransferError> {
        self.ensure_open("OpenFileRO")?;
        let (size, staging_only) = {
            let state = self.state.lock();
            if let Some(code) = state.open_failure {
                return Err(TransferError::Nack {
                    operation: "OpenFileRO".into(),
                    code,
                });
            }
            let size = state
                .files
                .get(&normalize(remote_path))
                .copied()
                .ok_or_else(|| TransferError::Nack {
                    operation: "OpenFileRO".into(),
                    code: NACK_FILE_NOT_FOUND,
                })?;
            (size, state.staging_only)
        };

        let destination = if staging_only {
            self.staging.as_path()
        } else {
            local_path
        };
        let mut file = File::create(destination)?;
        let total = usize::try_from(size).map_err(|e| TransferError::Io(e.to_string()))?;
        let block: Vec<u8> = (0..self.chunk).map(|i| (i % 251) as u8).collect();
        let mut written = 0usize;
        while written < total {
            let n = self.chunk.min(total - written);
            file.write_all(&block[..n])?;
            written += n;
            progress(written as f32 / total as f32);
        }
        if total == 0 {
            progress(1.0);
        }
        file.flush()?;
        Ok(())
    }

    fn remove(&mut self, remote_path: &str) -> Result<(), TransferError> {
        self.ensure_open("RemoveFile")?;
        let path = normalize(remote_path);
        let mut state = self.state.lock();
        if state.files.remove(&path).is_none() {
            return Err(TransferError::Nack {
                operation: "RemoveFile".into(),
                code: NACK_FILE_NOT_FOUND,
            });
        }
        state.removed.push(path);
        Ok(())
    }

    fn staging_path(&self) -> Option<PathBuf> {
        Some(self.staging.clone())
    }

    fn close(&mut self) {
        self.closed = true;
        if self.staging.exists() {
            let _ = fs::remove_file(&self.staging);
        }
    }
}
