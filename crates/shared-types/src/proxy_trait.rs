//! # Proxy Trait
//!
//! Lifecycle contract every gateway proxy implements so the runtime can
//! start, stop and report on them uniformly.
//!
//! ```rust,ignore
//! #[async_trait]
//! impl Proxy for MyProxy {
//!     fn name(&self) -> &'static str { "my_proxy" }
//!     async fn start(&self) -> Result<(), ProxyError> { Ok(()) }
//!     async fn stop(&self) -> Result<(), ProxyError> { Ok(()) }
//!     fn status(&self) -> ProxyStatus { ProxyStatus::Running }
//! }
//! ```

use crate::errors::ProxyError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    /// Start was attempted and failed.
    Failed,
}

impl fmt::Display for ProxyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Snapshot reported by `gateway.status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyInfo {
    pub name: String,
    pub status: ProxyStatus,
}

/// Lifecycle contract of a gateway proxy.
#[async_trait]
pub trait Proxy: Send + Sync {
    /// Stable identifier used in logs and status reports.
    fn name(&self) -> &'static str;

    /// Connect and begin serving. Must not block the calling scheduler.
    async fn start(&self) -> Result<(), ProxyError>;

    /// Stop serving. Best effort; never hangs.
    async fn stop(&self) -> Result<(), ProxyError>;

    fn status(&self) -> ProxyStatus;

    fn info(&self) -> ProxyInfo {
        ProxyInfo {
            name: self.name().to_string(),
            status: self.status(),
        }
    }
}
