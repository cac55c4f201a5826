//! # GW-02 File Transfer
//!
//! Proxy for bulk file access on the vehicle: log listing matched against
//! the vehicle's log index, downloads with progress, error-log cleanup and
//! the vehicle's clock.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Threading
//!
//! Every blocking protocol call runs on a dedicated worker pool (one
//! thread by default). The async surface awaits the worker's result;
//! download progress is forwarded back and delivered to the caller's
//! callback on the caller's task, never on the worker.
//!
//! ```text
//! async caller ──submit──→ ┌──────────────┐ ──list/get──→ TransferSession
//!      ↑                   │ worker pool  │
//!      └──progress/result──└──────────────┘ ←──────────── vehicle
//! ```
//!
//! ## Module Structure
//!
//! ```text
//! gw-02-file-transfer/
//! ├── domain/          # Entities, index matching, clock extraction, errors
//! ├── ports/           # TransferSession / TransferConnector traits
//! ├── adapters/        # SimulatedVehicle
//! ├── application/     # Worker pool, blocking client, async proxy
//! └── config.rs        # FileTransferConfig
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use adapters::SimulatedVehicle;
pub use application::{FileTransferProxy, TransferClient, TransferStatsSnapshot, WorkerPool};
pub use config::FileTransferConfig;
pub use domain::{
    extract_remote_clock, match_files_to_index, DirEntry, DownloadOutcome, LogEntryMeta, LogIndex,
    LogInfo, MatchedLog, RemoteClock, RemoteFile, TransferError, DEFAULT_SIZE_TOLERANCE,
};
pub use ports::{TransferChannel, TransferConnector, TransferSession, TransferSettings};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
