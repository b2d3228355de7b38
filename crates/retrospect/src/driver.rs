use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};

use crate::error::{Result, RetroError};
use crate::options::RetroOptions;
use crate::pool::{self, PoolObserver};
use crate::progress::{Phase, ProgressSnapshot, StatusSink};
use crate::prompts;
use crate::record::{self, Record};
use crate::scanner;
use crate::supervisor;

/// Base name of the synthesis report files.
pub const REPORT_BASENAME: &str = "workflow-improvement-report";

/// Failure excerpts are truncated to this many bytes for display.
const ERROR_EXCERPT_LEN: usize = 200;

/// How many failures are shown inline before the overflow counter.
const MAX_INLINE_FAILURES: usize = 3;

/// Outcome of one per-record analysis task.
///
/// Success requires a zero exit, no kill, non-empty output, and a durably
/// written artifact. Failures are values; the batch never aborts on one.
#[derive(Debug)]
pub struct TaskResult {
    pub record: Record,
    pub success: bool,
    pub error: Option<String>,
    pub stdout: String,
}

impl TaskResult {
    fn success(record: &Record, stdout: String) -> Self {
        Self {
            record: record.clone(),
            success: true,
            error: None,
            stdout,
        }
    }

    fn failure(record: &Record, error: String) -> Self {
        Self {
            record: record.clone(),
            success: false,
            error: Some(error),
            stdout: String::new(),
        }
    }
}

/// End-of-run accounting for the operator notification.
#[derive(Debug)]
pub struct RunSummary {
    pub in_scope: usize,
    pub skipped_existing: usize,
    pub selected: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Artifacts the synthesis step considered (old and new).
    pub considered: usize,
    pub report_path: Option<PathBuf>,
    /// `(stem, error)` per failed analysis, in item order.
    pub failures: Vec<(String, String)>,
    pub synthesis_error: Option<String>,
    pub dry_run: bool,
}

impl RunSummary {
    fn new(in_scope: usize, skipped_existing: usize, selected: usize, dry_run: bool) -> Self {
        Self {
            in_scope,
            skipped_existing,
            selected,
            succeeded: 0,
            failed: 0,
            considered: 0,
            report_path: None,
            failures: Vec::new(),
            synthesis_error: None,
            dry_run,
        }
    }

    /// Single end-of-run notification text.
    pub fn notification(&self) -> String {
        if self.dry_run {
            return format!(
                "Dry run: {} in scope, {} skipped, {} would be analyzed",
                self.in_scope, self.skipped_existing, self.selected
            );
        }

        let mut lines = vec![format!(
            "Analyzed {} sessions this run ({} succeeded, {} failed); synthesis considered {} artifacts",
            self.selected, self.succeeded, self.failed, self.considered
        )];

        for (stem, error) in self.failures.iter().take(MAX_INLINE_FAILURES) {
            lines.push(format!("  failed {}: {}", stem, error));
        }
        let overflow = self.failures.len().saturating_sub(MAX_INLINE_FAILURES);
        if overflow > 0 {
            lines.push(format!("  (+{} more failures)", overflow));
        }

        match (&self.report_path, &self.synthesis_error) {
            (Some(report), _) => lines.push(format!("Report: {}", report.display())),
            (None, Some(error)) => lines.push(format!("No report produced: {}", error)),
            (None, None) => lines.push("No report produced: nothing to review".to_string()),
        }

        lines.join("\n")
    }
}

/// The two-phase retrospective pipeline: fan-out analysis over discovered
/// records, then one fan-in synthesis pass over all artifacts.
pub struct Retro {
    options: RetroOptions,
    transcripts_dir: PathBuf,
    scope_root: PathBuf,
    tool: String,
}

impl Retro {
    pub fn new(
        options: RetroOptions,
        transcripts_dir: impl Into<PathBuf>,
        scope_root: impl Into<PathBuf>,
        tool: impl Into<String>,
    ) -> Self {
        Self {
            options,
            transcripts_dir: transcripts_dir.into(),
            scope_root: scope_root.into(),
            tool: tool.into(),
        }
    }

    /// Runs one full pipeline pass. Every exit path, including dry runs,
    /// synthesis failure, and driver errors, reaches `Done` and clears the
    /// sink.
    pub async fn run(&self, sink: Arc<dyn StatusSink>) -> Result<RunSummary> {
        let output_dir = self.resolved_output_dir();
        let snapshot = Arc::new(Mutex::new(ProgressSnapshot::new(output_dir.clone())));
        push(&snapshot, &sink);

        let result = self.run_phases(&output_dir, &snapshot, &sink).await;

        advance(&snapshot, &sink, Phase::Done);
        sink.clear();
        result
    }

    async fn run_phases(
        &self,
        output_dir: &Path,
        snapshot: &Arc<Mutex<ProgressSnapshot>>,
        sink: &Arc<dyn StatusSink>,
    ) -> Result<RunSummary> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(self.options.days));

        let candidates = scanner::scan_transcripts(&self.transcripts_dir);
        let in_scope = record::in_scope_records(&candidates, cutoff, &self.scope_root, output_dir);
        let discovery = record::select_for_analysis(in_scope, self.options.limit);

        {
            let mut snap = snapshot.lock().expect("progress mutex");
            snap.in_scope = discovery.in_scope;
            snap.skipped_existing = discovery.skipped_existing;
            snap.selected = discovery.selected.len();
        }
        push(&snapshot, &sink);

        let mut summary = RunSummary::new(
            discovery.in_scope,
            discovery.skipped_existing,
            discovery.selected.len(),
            self.options.dry_run,
        );

        if self.options.dry_run {
            info!(
                "Dry run: {} records would be analyzed",
                discovery.selected.len()
            );
            return Ok(summary);
        }

        // Analysis fan-out
        advance(&snapshot, &sink, Phase::Analyzing);
        std::fs::create_dir_all(output_dir).map_err(|e| RetroError::CreateDirectory {
            path: output_dir.to_path_buf(),
            source: e,
        })?;

        let analyzer = Arc::new(Analyzer {
            tool: self.tool.clone(),
            timeout: self.options.timeout(),
            scope_root: self.scope_root.clone(),
        });
        let observer: Arc<dyn PoolObserver<Record, TaskResult>> = Arc::new(SnapshotObserver {
            snapshot: Arc::clone(snapshot),
            sink: Arc::clone(sink),
        });
        let worker = {
            let analyzer = Arc::clone(&analyzer);
            move |_index: usize, record: Arc<Record>| {
                let analyzer = Arc::clone(&analyzer);
                async move { analyzer.analyze(&record).await }
            }
        };

        let results =
            pool::run_pool(discovery.selected, self.options.concurrency, worker, observer).await;

        for result in &results {
            if result.success {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
                summary.failures.push((
                    result.record.stem.clone(),
                    result.error.clone().unwrap_or_default(),
                ));
            }
        }

        // Synthesis fan-in. The in-scope set is recomputed rather than
        // reused so artifacts written by a concurrent run are picked up.
        let rescan = scanner::scan_transcripts(&self.transcripts_dir);
        let in_scope_now =
            record::in_scope_records(&rescan, cutoff, &self.scope_root, output_dir);
        let artifacts: Vec<Record> = in_scope_now
            .into_iter()
            .filter(|record| record.artifact_path.exists())
            .collect();
        summary.considered = artifacts.len();

        if artifacts.is_empty() {
            info!("No artifacts available, skipping review");
            return Ok(summary);
        }

        advance(&snapshot, &sink, Phase::Reviewing);

        // The review invocation runs without tool access, so the bundle is
        // embedded in the prompt rather than referenced as a file.
        let bundle = build_bundle(&artifacts);
        let prompt = format!("{}\n\n{}", prompts::REVIEW_PROMPT, bundle);
        let outcome = supervisor::execute(
            &self.tool,
            &prompts::tool_args(&prompt, None),
            &self.scope_root,
            self.options.timeout(),
            &tool_env(),
        )
        .await;

        let report_body = outcome.stdout.trim();
        if outcome.succeeded() && !report_body.is_empty() {
            let tag = Utc::now().format("%Y%m%d-%H%M%SZ");
            let report_path = output_dir.join(format!("{}-{}.md", REPORT_BASENAME, tag));
            let latest_path = output_dir.join(format!("{}-latest.md", REPORT_BASENAME));
            let contents = format!("{}\n", report_body);

            for path in [&report_path, &latest_path] {
                std::fs::write(path, &contents).map_err(|e| RetroError::WriteReport {
                    path: path.clone(),
                    source: e,
                })?;
            }

            info!("Wrote report {}", report_path.display());
            snapshot.lock().expect("progress mutex").report_path = Some(report_path.clone());
            summary.report_path = Some(report_path);
        } else {
            let reason = if outcome.killed {
                "synthesis timed out".to_string()
            } else if outcome.exit_code != 0 {
                format!("synthesis exited with code {}", outcome.exit_code)
            } else {
                "synthesis produced no output".to_string()
            };
            warn!("{}", reason);
            summary.synthesis_error = Some(format!(
                "{}: {}",
                reason,
                truncate_excerpt(&outcome.stderr)
            ));
        }

        Ok(summary)
    }

    fn resolved_output_dir(&self) -> PathBuf {
        if self.options.output_dir.is_absolute() {
            self.options.output_dir.clone()
        } else {
            self.scope_root.join(&self.options.output_dir)
        }
    }
}

/// Runs one supervised analysis process and writes the artifact.
struct Analyzer {
    tool: String,
    timeout: Duration,
    scope_root: PathBuf,
}

impl Analyzer {
    #[tracing::instrument(skip_all, fields(record = %record.stem))]
    async fn analyze(&self, record: &Record) -> TaskResult {
        let prompt = prompts::analysis_prompt(&record.path);
        let args = prompts::tool_args(&prompt, Some(prompts::ANALYSIS_TOOLS));
        let outcome = supervisor::execute(
            &self.tool,
            &args,
            &self.scope_root,
            self.timeout,
            &tool_env(),
        )
        .await;

        if outcome.killed {
            return TaskResult::failure(
                record,
                format!("timed out: {}", truncate_excerpt(&outcome.stderr)),
            );
        }
        if outcome.exit_code != 0 {
            return TaskResult::failure(
                record,
                format!(
                    "exit code {}: {}",
                    outcome.exit_code,
                    truncate_excerpt(&outcome.stderr)
                ),
            );
        }

        let body = outcome.stdout.trim();
        if body.is_empty() {
            return TaskResult::failure(record, "produced no output".to_string());
        }

        let artifact = render_artifact(record, body);
        if let Err(e) = tokio::fs::write(&record.artifact_path, artifact).await {
            return TaskResult::failure(record, format!("failed to write artifact: {}", e));
        }

        info!("Wrote artifact {}", record.artifact_path.display());
        TaskResult::success(record, outcome.stdout)
    }
}

/// Bridges pool callbacks into the shared snapshot and the status sink.
struct SnapshotObserver {
    snapshot: Arc<Mutex<ProgressSnapshot>>,
    sink: Arc<dyn StatusSink>,
}

impl PoolObserver<Record, TaskResult> for SnapshotObserver {
    fn started(&self, _index: usize, record: &Record) {
        let mut snap = self.snapshot.lock().expect("progress mutex");
        snap.task_started(&record.stem);
        self.sink.update(&snap);
    }

    fn finished(&self, _index: usize, record: &Record, result: &TaskResult) {
        let mut snap = self.snapshot.lock().expect("progress mutex");
        snap.task_finished(&record.stem, result.success);
        self.sink.update(&snap);
    }
}

fn tool_env() -> Vec<(String, String)> {
    vec![(
        prompts::VERSION_CHECK_ENV.0.to_string(),
        prompts::VERSION_CHECK_ENV.1.to_string(),
    )]
}

/// Artifact layout: a 3-line HTML-comment preamble, the trimmed body, and a
/// trailing newline.
fn render_artifact(record: &Record, body: &str) -> String {
    format!(
        "<!-- source: {} -->\n<!-- source-created: {} -->\n<!-- generated: {} -->\n\n{}\n",
        record.path.display(),
        record.created_at.to_rfc3339(),
        Utc::now().to_rfc3339(),
        body
    )
}

/// One markdown bundle enumerating every artifact's path and trimmed content.
fn build_bundle(artifacts: &[Record]) -> String {
    let mut bundle = format!(
        "# Session analyses\n\nTotal: {}\nGenerated: {}\n",
        artifacts.len(),
        Utc::now().to_rfc3339()
    );

    for record in artifacts {
        let content = match std::fs::read_to_string(&record.artifact_path) {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    "Failed to read artifact {}: {}",
                    record.artifact_path.display(),
                    e
                );
                continue;
            }
        };

        bundle.push_str("\n---\n\n");
        bundle.push_str(&format!(
            "## {}.md\n\nPath: {}\n\n{}\n",
            record.stem,
            record.artifact_path.display(),
            content.trim()
        ));
    }

    bundle
}

fn truncate_excerpt(text: &str) -> String {
    let text = text.trim();
    if text.len() <= ERROR_EXCERPT_LEN {
        return text.to_string();
    }
    let mut end = ERROR_EXCERPT_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

fn push(snapshot: &Arc<Mutex<ProgressSnapshot>>, sink: &Arc<dyn StatusSink>) {
    let snap = snapshot.lock().expect("progress mutex");
    sink.update(&snap);
}

fn advance(snapshot: &Arc<Mutex<ProgressSnapshot>>, sink: &Arc<dyn StatusSink>, phase: Phase) {
    let mut snap = snapshot.lock().expect("progress mutex");
    snap.advance(phase);
    sink.update(&snap);
}
