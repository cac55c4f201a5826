//! Domain layer: transfer entities and the pure rules applied to them.

pub mod clock;
pub mod entities;
pub mod errors;
pub mod matching;

pub use clock::extract_remote_clock;
pub use entities::*;
pub use errors::TransferError;
pub use matching::{match_files_to_index, sorted_log_infos, MatchedLog, DEFAULT_SIZE_TOLERANCE};
