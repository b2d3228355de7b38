use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, info};
use serde::Deserialize;

/// Filename timestamp layout: `YYYY-MM-DDTHH-MM-SS-mmmZ` before the first
/// underscore. The `-` separators in the time portion stand in for `:`,
/// which is not filename-safe.
const STEM_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S-%3fZ";

/// One discovered transcript eligible for analysis.
///
/// Immutable after construction; the artifact path is deterministic from the
/// stem and the output directory, which is what makes dedup idempotent.
#[derive(Debug, Clone)]
pub struct Record {
    /// Absolute path of the transcript file.
    pub path: PathBuf,
    /// File name without the extension.
    pub stem: String,
    /// Creation timestamp, decoded from the file name with an mtime fallback.
    pub created_at: DateTime<Utc>,
    /// Origin working directory declared in the transcript header.
    pub project_dir: PathBuf,
    /// Where this record's analysis artifact is (or will be) written.
    pub artifact_path: PathBuf,
}

/// Result of scan + filter + dedup for one run.
#[derive(Debug)]
pub struct Discovery {
    /// Records selected for analysis, oldest first, after cap.
    pub selected: Vec<Record>,
    /// All records in scope for this run, before dedup and cap.
    pub in_scope: usize,
    /// Records excluded because their artifact already exists.
    pub skipped_existing: usize,
}

/// First line of a transcript file.
#[derive(Deserialize)]
struct SessionHeader {
    #[serde(rename = "type")]
    kind: String,
    cwd: Option<PathBuf>,
}

/// Filters scanned candidates down to in-scope records, sorted by creation
/// timestamp ascending. Files with a missing or foreign header, an origin
/// outside `scope_root`, or a timestamp older than `cutoff` are dropped
/// silently.
pub fn in_scope_records(
    candidates: &[PathBuf],
    cutoff: DateTime<Utc>,
    scope_root: &Path,
    output_dir: &Path,
) -> Vec<Record> {
    let mut records: Vec<Record> = candidates
        .iter()
        .filter_map(|path| parse_record(path, output_dir))
        .filter(|record| {
            if record.created_at < cutoff {
                debug!("Skipping {} (older than cutoff)", record.stem);
                return false;
            }
            if !is_within_scope(&record.project_dir, scope_root) {
                debug!("Skipping {} (outside scope root)", record.stem);
                return false;
            }
            true
        })
        .collect();

    records.sort_by_key(|record| record.created_at);
    records
}

/// Splits in-scope records into selected work and skipped-existing counts.
/// The cap truncates to the oldest `limit` entries after sorting; the
/// in-scope and skipped counts reflect the uncapped set.
pub fn select_for_analysis(in_scope: Vec<Record>, limit: Option<usize>) -> Discovery {
    let total = in_scope.len();

    let mut selected = Vec::new();
    let mut skipped_existing = 0;

    for record in in_scope {
        if record.artifact_path.exists() {
            debug!("Skipping {} (artifact exists)", record.stem);
            skipped_existing += 1;
        } else {
            selected.push(record);
        }
    }

    if let Some(limit) = limit {
        selected.truncate(limit);
    }

    info!(
        "Discovery: {} in scope, {} skipped, {} selected",
        total,
        skipped_existing,
        selected.len()
    );

    Discovery {
        selected,
        in_scope: total,
        skipped_existing,
    }
}

/// True when `origin` equals `scope_root` or is nested under it. The check
/// is component-wise: `/repo` does not contain `/repository`.
pub fn is_within_scope(origin: &Path, scope_root: &Path) -> bool {
    origin.starts_with(scope_root)
}

fn parse_record(path: &Path, output_dir: &Path) -> Option<Record> {
    let stem = path.file_stem()?.to_str()?.to_string();
    let project_dir = read_session_header(path)?;
    let created_at = creation_timestamp(path, &stem);
    let artifact_path = output_dir.join(format!("{}.md", stem));

    Some(Record {
        path: path.to_path_buf(),
        stem,
        created_at,
        project_dir,
        artifact_path,
    })
}

/// Reads and validates the first-line header. Anything that is not a
/// well-formed session header excludes the file, without error.
fn read_session_header(path: &Path) -> Option<PathBuf> {
    let file = File::open(path).ok()?;
    let mut first_line = String::new();
    BufReader::new(file).read_line(&mut first_line).ok()?;

    let header: SessionHeader = serde_json::from_str(first_line.trim()).ok()?;
    if header.kind != "session" {
        return None;
    }
    header.cwd
}

/// Decodes the creation timestamp from the file name, falling back to the
/// filesystem modification time when the name carries no parseable stamp.
fn creation_timestamp(path: &Path, stem: &str) -> DateTime<Utc> {
    if let Some(stamp) = timestamp_from_stem(stem) {
        return stamp;
    }

    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn timestamp_from_stem(stem: &str) -> Option<DateTime<Utc>> {
    let leading = stem.split('_').next()?;
    NaiveDateTime::parse_from_str(leading, STEM_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}
