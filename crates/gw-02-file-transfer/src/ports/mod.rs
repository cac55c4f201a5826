//! Ports: the outbound seams of the file-transfer proxy.

pub mod outbound;

pub use outbound::{TransferChannel, TransferConnector, TransferSession, TransferSettings};
