//! # Shared Bus - Bridge Runtime for Link I/O
//!
//! Moves traffic between callers and a link driver on a dedicated I/O
//! thread. Callers never touch the link: they enqueue outbound messages
//! into per-key mailboxes and register handlers for inbound keys.
//!
//! ```text
//!   callers                       I/O thread                    link
//! ┌──────────┐  send()     ┌──────────────────┐  write_once  ┌────────┐
//! │          │ ──────────→ │ outbound mailbox │ ───────────→ │        │
//! │          │             └──────────────────┘              │ driver │
//! │          │  handlers   ┌──────────────────┐  read_once   │        │
//! │          │ ←────────── │ registry + inbox │ ←─────────── │        │
//! └──────────┘             └──────────────────┘              └────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Bounded memory:** mailboxes evict their oldest entry when full.
//! - **Single writer:** only the I/O thread touches the driver while the
//!   bridge runs.
//! - **Isolated handlers:** a failing or panicking handler is logged and
//!   does not stop dispatch to the others.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod burst;
pub mod driver;
pub mod mailbox;
pub mod registry;
pub mod runtime;
pub mod signal;

pub use burst::{BurstSpec, MAX_BURST_COUNT};
pub use driver::{DriverError, LinkDriver, OpenAbort, OutboundBatch};
pub use mailbox::{BoundedMailbox, MailboxSet};
pub use registry::{DispatchReport, HandlerError, HandlerId, HandlerRegistry};
pub use runtime::{BridgeConfig, BridgeRuntime, BridgeState, BridgeStatsSnapshot, BusError};
pub use signal::Latch;

/// Mailbox capacity used when none is configured.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 200;

/// Sleep between I/O loop iterations.
pub const DEFAULT_LOOP_INTERVAL_MS: u64 = 10;

/// Upper bound on how long `stop()` waits for the I/O thread and the driver.
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 5_000;
