use std::path::PathBuf;

/// Maximum number of active item names shown before the overflow count.
const MAX_ACTIVE_NAMES: usize = 3;

/// Phase of the retrospective pipeline. Strictly forward-moving; every exit
/// path, including dry runs, ends at [`Phase::Done`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Discovering,
    Analyzing,
    Reviewing,
    Done,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Discovering => write!(f, "Discovering"),
            Phase::Analyzing => write!(f, "Analyzing"),
            Phase::Reviewing => write!(f, "Reviewing"),
            Phase::Done => write!(f, "Done"),
        }
    }
}

/// Single mutable snapshot of pipeline progress for one run.
///
/// Mutated only by the pipeline driver and the pool's observer hooks; the
/// rendering collaborator only reads it. Invariants:
/// `finished == succeeded + failed` and `running + finished <= selected`.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub phase: Phase,
    pub in_scope: usize,
    pub skipped_existing: usize,
    pub selected: usize,
    pub running: usize,
    pub finished: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Stems of records currently being analyzed, in start order.
    pub active: Vec<String>,
    pub output_dir: PathBuf,
    /// Set once the synthesis report has been written.
    pub report_path: Option<PathBuf>,
}

impl ProgressSnapshot {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            phase: Phase::Discovering,
            in_scope: 0,
            skipped_existing: 0,
            selected: 0,
            running: 0,
            finished: 0,
            succeeded: 0,
            failed: 0,
            active: Vec::new(),
            output_dir,
            report_path: None,
        }
    }

    /// Moves to `phase` if it is ahead of the current one. Backward
    /// transitions are ignored.
    pub fn advance(&mut self, phase: Phase) {
        if phase > self.phase {
            self.phase = phase;
        }
    }

    pub fn task_started(&mut self, name: &str) {
        self.running += 1;
        self.active.push(name.to_string());
    }

    pub fn task_finished(&mut self, name: &str, success: bool) {
        self.running = self.running.saturating_sub(1);
        self.finished += 1;
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.active.retain(|active| active != name);
    }
}

/// Renders the multi-line detail view of a snapshot.
pub fn render(snapshot: &ProgressSnapshot) -> Vec<String> {
    let mut lines = vec![
        format!("Session retro: {}", snapshot.phase),
        format!(
            "In scope: {} ({} skipped, {} selected)",
            snapshot.in_scope, snapshot.skipped_existing, snapshot.selected
        ),
        format!(
            "Finished {}/{} ({} ok, {} failed), {} running, {} remaining",
            snapshot.finished,
            snapshot.selected,
            snapshot.succeeded,
            snapshot.failed,
            snapshot.running,
            snapshot
                .selected
                .saturating_sub(snapshot.finished + snapshot.running),
        ),
        format!("Output: {}", snapshot.output_dir.display()),
    ];

    if !snapshot.active.is_empty() {
        let shown: Vec<&str> = snapshot
            .active
            .iter()
            .take(MAX_ACTIVE_NAMES)
            .map(String::as_str)
            .collect();
        let overflow = snapshot.active.len().saturating_sub(MAX_ACTIVE_NAMES);
        if overflow > 0 {
            lines.push(format!("Active: {} (+{} more)", shown.join(", "), overflow));
        } else {
            lines.push(format!("Active: {}", shown.join(", ")));
        }
    }

    if snapshot.phase == Phase::Done {
        if let Some(report) = &snapshot.report_path {
            lines.push(format!("Report: {}", report.display()));
        }
    }

    lines
}

/// Single-line status indicator form.
pub fn short_status(snapshot: &ProgressSnapshot) -> String {
    format!(
        "{}/{} done • {} running",
        snapshot.finished, snapshot.selected, snapshot.running
    )
}

/// The external rendering collaborator. The pipeline pushes every snapshot
/// mutation through this; implementations decide how (or whether) to draw.
pub trait StatusSink: Send + Sync {
    fn update(&self, snapshot: &ProgressSnapshot);

    /// Called exactly once at run end, success or failure.
    fn clear(&self) {}
}

/// Sink for callers that don't render progress.
pub struct NoopSink;

impl StatusSink for NoopSink {
    fn update(&self, _snapshot: &ProgressSnapshot) {}
}
