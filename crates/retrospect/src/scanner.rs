use std::path::{Path, PathBuf};

use log::{debug, info};
use walkdir::WalkDir;

/// File extension of session transcript records.
const TRANSCRIPT_EXTENSION: &str = "jsonl";

/// Subdirectory name excluded from the recursive scan.
const EXCLUDED_DIR: &str = "subagents";

/// Recursively enumerates candidate transcript files under `base`.
///
/// Returns an empty list when `base` does not exist. Unreadable
/// subdirectories are skipped, not errored: discovery must never fail the
/// whole run because of one bad directory. No ordering guarantee.
pub fn scan_transcripts(base: &Path) -> Vec<PathBuf> {
    if !base.is_dir() {
        debug!("Transcript directory {} does not exist", base.display());
        return Vec::new();
    }

    let mut found = Vec::new();

    for entry in WalkDir::new(base)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && e.file_name() == EXCLUDED_DIR))
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if path.is_dir() {
            continue;
        }

        if path.extension().and_then(|e| e.to_str()) == Some(TRANSCRIPT_EXTENSION) {
            debug!("Found transcript: {}", path.display());
            found.push(path.to_path_buf());
        }
    }

    info!(
        "Scanned {} transcripts in {}",
        found.len(),
        base.display()
    );
    found
}
