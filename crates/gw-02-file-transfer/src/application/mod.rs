//! Application layer: worker pool, blocking client and the async proxy.

pub mod client;
pub mod service;
pub mod worker;

pub use client::{TransferClient, TransferStats, TransferStatsSnapshot};
pub use service::{FileTransferProxy, PROXY_NAME};
pub use worker::WorkerPool;
