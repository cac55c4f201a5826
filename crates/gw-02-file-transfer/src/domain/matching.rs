//! # Log Index Matching
//!
//! Directory listings carry names and sizes; the log index carries ids,
//! sizes and timestamps. The two are joined by size alone:
//!
//! 1. Counts must be equal, otherwise matching is refused.
//! 2. Files and index entries are both ordered by size, largest first.
//! 3. Each index entry takes the first remaining file whose size is within
//!    the tolerance, and that file is consumed.
//!
//! Equal sizes keep listing order (and id order on the index side), so two
//! same-sized files of one day pair up in scan order.

use super::entities::{LogEntryMeta, LogIndex, LogInfo, RemoteFile};
use serde::{Deserialize, Serialize};
use shared_types::ProxyError;
use std::collections::BTreeMap;
use tracing::warn;

/// Largest size difference, in bytes, still considered the same log.
pub const DEFAULT_SIZE_TOLERANCE: u64 = 4096;

/// An index entry joined to the file it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedLog {
    pub entry: LogEntryMeta,
    pub file: RemoteFile,
}

/// Pair every index entry with a distinct listed file.
///
/// Entries with no file in tolerance are left out of the result and logged.
///
/// # Errors
///
/// [`ProxyError::CountMismatch`] when the file and entry counts differ.
pub fn match_files_to_index(
    files: &[RemoteFile],
    index: &LogIndex,
    tolerance: u64,
) -> Result<BTreeMap<u32, MatchedLog>, ProxyError> {
    if files.len() != index.len() {
        return Err(ProxyError::CountMismatch {
            index: index.len(),
            files: files.len(),
        });
    }

    let mut remaining: Vec<&RemoteFile> = files.iter().collect();
    remaining.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
    let mut entries: Vec<&LogEntryMeta> = index.values().collect();
    entries.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));

    let mut mapping = BTreeMap::new();
    for entry in entries {
        let found = remaining
            .iter()
            .position(|file| file.size_bytes.abs_diff(entry.size_bytes) <= tolerance);
        match found {
            Some(pos) => {
                let file = remaining.remove(pos);
                mapping.insert(
                    entry.id,
                    MatchedLog {
                        entry: *entry,
                        file: file.clone(),
                    },
                );
            }
            None => warn!(
                id = entry.id,
                size_bytes = entry.size_bytes,
                tolerance,
                "No listed file matches index entry"
            ),
        }
    }
    Ok(mapping)
}

/// Flatten a mapping into [`LogInfo`] rows sorted by timestamp, oldest
/// first.
pub fn sorted_log_infos(mapping: BTreeMap<u32, MatchedLog>) -> Vec<LogInfo> {
    let mut infos: Vec<LogInfo> = mapping
        .into_values()
        .map(|matched| LogInfo {
            remote_path: matched.file.path,
            size_bytes: matched.file.size_bytes,
            utc: matched.entry.utc_seconds,
        })
        .collect();
    infos.sort_by_key(|info| info.utc);
    infos
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::ErrorKind;

    fn file(path: &str, size: u64) -> RemoteFile {
        RemoteFile {
            path: path.to_string(),
            size_bytes: size,
        }
    }

    fn index(entries: &[(u32, u64, u64)]) -> LogIndex {
        entries
            .iter()
            .map(|&(id, size_bytes, utc_seconds)| {
                (
                    id,
                    LogEntryMeta {
                        id,
                        size_bytes,
                        utc_seconds,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_exact_sizes() {
        let files = [file("file1", 1024), file("file2", 2048)];
        let index = index(&[(1, 1024, 100), (2, 2048, 200)]);
        let mapping = match_files_to_index(&files, &index, 1).unwrap();
        assert_eq!(mapping[&1].file.path, "file1");
        assert_eq!(mapping[&2].file.path, "file2");
    }

    #[test]
    fn test_within_tolerance() {
        let files = [file("file1", 1000), file("file2", 2050)];
        let index = index(&[(1, 1024, 100), (2, 2048, 200)]);
        let mapping = match_files_to_index(&files, &index, 100).unwrap();
        assert_eq!(mapping[&1].file.size_bytes, 1000);
        assert_eq!(mapping[&2].file.size_bytes, 2050);
    }

    #[test]
    fn test_count_mismatch() {
        let files = [file("a", 1), file("b", 2), file("c", 3)];
        let index = index(&[(1, 1, 0), (2, 2, 0)]);
        let err = match_files_to_index(&files, &index, 4096).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CountMismatch);
        assert_eq!(err, ProxyError::CountMismatch { index: 2, files: 3 });
    }

    #[test]
    fn test_each_file_used_once() {
        let files = [file("a", 5000), file("b", 5100), file("c", 90_000)];
        let index = index(&[(1, 5050, 0), (2, 5050, 0), (3, 90_000, 0)]);
        let mapping = match_files_to_index(&files, &index, 4096).unwrap();
        let mut paths: Vec<_> = mapping.values().map(|m| m.file.path.as_str()).collect();
        paths.sort_unstable();
        assert_eq!(paths, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_largest_first_prevents_greedy_steal() {
        let files = [file("small", 100), file("large", 8000)];
        let index = index(&[(1, 4000, 0), (2, 8000, 0)]);
        let mapping = match_files_to_index(&files, &index, 4096).unwrap();
        assert_eq!(mapping[&2].file.path, "large");
        assert_eq!(mapping[&1].file.path, "small");
    }

    #[test]
    fn test_equal_sizes_pair_in_scan_order() {
        let files = [file("first", 2048), file("second", 2048)];
        let index = index(&[(7, 2048, 0), (9, 2048, 0)]);
        let mapping = match_files_to_index(&files, &index, 0).unwrap();
        assert_eq!(mapping[&7].file.path, "first");
        assert_eq!(mapping[&9].file.path, "second");
    }

    #[test]
    fn test_unmatched_entry_is_omitted() {
        let files = [file("a", 100), file("b", 200)];
        let index = index(&[(1, 100, 0), (2, 1_000_000, 0)]);
        let mapping = match_files_to_index(&files, &index, 10).unwrap();
        assert_eq!(mapping.len(), 1);
        assert!(mapping.contains_key(&1));
    }

    #[test]
    fn test_infos_sorted_by_time() {
        let files = [file("new", 10), file("old", 20000)];
        let index = index(&[(1, 10, 300), (2, 20000, 100)]);
        let infos = sorted_log_infos(match_files_to_index(&files, &index, 0).unwrap());
        let paths: Vec<_> = infos.iter().map(|i| i.remote_path.as_str()).collect();
        assert_eq!(paths, vec!["old", "new"]);
        assert_eq!(infos[0].utc, 100);
    }

    #[test]
    fn test_empty_inputs() {
        let mapping = match_files_to_index(&[], &LogIndex::new(), 4096).unwrap();
        assert!(mapping.is_empty());
    }
}
