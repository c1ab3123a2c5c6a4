//! Recursive discovery of case CSV files

use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use casebase_core::{CaseError, Result};

/// File extension of ingestible case files
pub const CASE_FILE_EXTENSION: &str = "csv";

/// Walk `root` recursively and collect every case file under it, in a
/// deterministic (name-sorted) traversal order.
///
/// Fails with `NotFound` when `root` is not a directory. Entries that
/// cannot be read are logged and skipped, never fatal.
pub fn discover_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(CaseError::NotFound(format!(
            "directory {} does not exist",
            root.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable entry under {}: {}", root.display(), err);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_case_file = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(CASE_FILE_EXTENSION))
            .unwrap_or(false);
        if is_case_file {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}
