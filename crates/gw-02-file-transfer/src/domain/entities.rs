//! # Transfer Entities

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One entry of the vehicle's log index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntryMeta {
    pub id: u32,
    pub size_bytes: u64,
    /// Log start time in seconds since the Unix epoch. 0 when unknown.
    pub utc_seconds: u64,
}

/// Log index keyed by log id.
pub type LogIndex = BTreeMap<u32, LogEntryMeta>;

/// A file found by walking the remote log directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Full remote path, e.g. `fs/microsd/log/2024-05-01/12_00_00.log`.
    pub path: String,
    pub size_bytes: u64,
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub size_bytes: u64,
    pub is_dir: bool,
}

impl DirEntry {
    pub fn file(name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            is_dir: false,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size_bytes: 0,
            is_dir: true,
        }
    }

    /// `.` and `..` rows some listings include.
    #[must_use]
    pub fn is_navigation(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

/// A listed log file paired with its index timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogInfo {
    pub remote_path: String,
    pub size_bytes: u64,
    pub utc: u64,
}

/// The vehicle's clock, resolved to absolute time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteClock {
    /// Seconds since the Unix epoch.
    pub timestamp_s: i64,
    /// `timestamp_s` formatted as `YYYY-MM-DD HH:MM:SS` UTC.
    pub utc_human: String,
    /// Field of the reply the reading came from.
    pub source_field: String,
    /// Estimated boot time, present for boot-relative readings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_epoch_s: Option<i64>,
}

/// Result of a completed download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOutcome {
    pub local_path: PathBuf,
    pub size_bytes: u64,
    /// The session left its data in a staging file that was moved into
    /// place afterwards.
    pub recovered_from_staging: bool,
}
