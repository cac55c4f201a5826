//! # Outbound Ports
//!
//! The transfer proxy needs two things from the vehicle side: a plain link
//! for index and clock requests, and a file session for listing, fetching
//! and removing files. A [`TransferConnector`] opens both together.

use crate::domain::{DirEntry, TransferError};
use serde::{Deserialize, Serialize};
use shared_types::{LinkConnection, LinkEndpoint};
use std::path::{Path, PathBuf};

/// Session tuning applied on connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Protocol debug verbosity.
    pub debug: u8,
    /// Retry period for unanswered requests.
    pub retry_time_ms: u64,
    /// Bytes requested per burst read.
    pub burst_read_size: u16,
}

/// Blocking file operations on the vehicle.
///
/// Implementations are driven from a single worker thread at a time.
pub trait TransferSession: Send {
    /// List one remote directory.
    fn list(&mut self, path: &str) -> Result<Vec<DirEntry>, TransferError>;

    /// Fetch `remote_path` into `local_path`, reporting progress as a
    /// fraction in `[0, 1]`.
    fn get(
        &mut self,
        remote_path: &str,
        local_path: &Path,
        progress: &mut dyn FnMut(f32),
    ) -> Result<(), TransferError>;

    /// Delete one remote file.
    fn remove(&mut self, remote_path: &str) -> Result<(), TransferError>;

    /// Where the session stages data before moving it to the requested
    /// local path, if it stages at all.
    fn staging_path(&self) -> Option<PathBuf>;

    fn close(&mut self);
}

/// A connected link plus the file session running over it.
pub struct TransferChannel {
    pub link: Box<dyn LinkConnection>,
    pub session: Box<dyn TransferSession>,
}

impl TransferChannel {
    pub fn close(&mut self) {
        self.session.close();
        self.link.close();
    }
}

/// Opens transfer channels.
pub trait TransferConnector: Send + Sync {
    fn connect(
        &self,
        endpoint: &LinkEndpoint,
        settings: &TransferSettings,
    ) -> Result<TransferChannel, TransferError>;
}
