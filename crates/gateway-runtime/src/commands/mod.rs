//! # Gateway Commands
//!
//! Named operations callers run against the proxies, with JSON params and
//! JSON results.

pub mod error;
pub mod router;

pub use error::{codes, CommandError};
pub use router::{command_names, route_command, CommandFuture, CommandHandler, CommandTable};
