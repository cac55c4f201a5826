//! # Runtime Adapters
//!
//! Concrete link and transfer connectors chosen from the configured
//! endpoints.

pub mod connectors;

pub use connectors::Connectors;
