//! End-to-end pipeline tests using a stub analysis tool.

#![cfg(unix)]

mod common;

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use retrospect::{Phase, Retro, RetroOptions, REPORT_BASENAME};
use tempfile::TempDir;

use common::{fake_tool, stamped_name, write_transcript, RecordingSink};

struct Fixture {
    _tmp: TempDir,
    transcripts: PathBuf,
    scope: PathBuf,
    output: PathBuf,
    tool_dir: PathBuf,
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let transcripts = tmp.path().join("transcripts");
    let scope = tmp.path().join("repo");
    let output = tmp.path().join("out");
    let tool_dir = tmp.path().join("bin");
    std::fs::create_dir_all(&transcripts).unwrap();
    std::fs::create_dir_all(&scope).unwrap();
    std::fs::create_dir_all(&tool_dir).unwrap();

    Fixture {
        _tmp: tmp,
        transcripts,
        scope,
        output,
        tool_dir,
    }
}

fn options(output: &PathBuf) -> RetroOptions {
    RetroOptions {
        days: 7,
        concurrency: 2,
        timeout_minutes: 1,
        output_dir: output.clone(),
        limit: None,
        dry_run: false,
    }
}

#[tokio::test]
async fn dry_run_reports_counts_and_reaches_done() {
    let fx = fixture();
    for i in 0..3 {
        write_transcript(&fx.transcripts, &stamped_name(0, &format!("s{}", i)), &fx.scope);
    }
    write_transcript(&fx.transcripts, &stamped_name(30, "ancient"), &fx.scope);

    let tool = fake_tool(&fx.tool_dir, "echo analysis");
    let mut opts = options(&fx.output);
    opts.dry_run = true;

    let sink = Arc::new(RecordingSink::default());
    let summary = Retro::new(opts, &fx.transcripts, &fx.scope, tool)
        .run(sink.clone())
        .await
        .unwrap();

    assert!(summary.dry_run);
    assert_eq!(summary.in_scope, 3);
    assert_eq!(summary.selected, 3);
    assert_eq!(summary.succeeded, 0);
    assert!(summary.report_path.is_none());
    assert!(!fx.output.exists());

    let phases = sink.phases.lock().unwrap().clone();
    assert_eq!(phases, vec![Phase::Discovering, Phase::Done]);
    assert!(sink.cleared.load(Ordering::SeqCst));
}

#[tokio::test]
async fn full_run_writes_artifacts_and_report() {
    let fx = fixture();
    write_transcript(&fx.transcripts, &stamped_name(1, "alpha"), &fx.scope);
    write_transcript(&fx.transcripts, &stamped_name(0, "beta"), &fx.scope);

    let tool = fake_tool(&fx.tool_dir, "echo analysis output");
    let sink = Arc::new(RecordingSink::default());
    let summary = Retro::new(options(&fx.output), &fx.transcripts, &fx.scope, tool)
        .run(sink.clone())
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.considered, 2);
    assert!(summary.synthesis_error.is_none());

    // Artifacts carry the 3-line comment preamble and the trimmed body.
    let mut artifacts: Vec<PathBuf> = std::fs::read_dir(&fx.output)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension().is_some_and(|e| e == "md")
                && !p
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .starts_with(REPORT_BASENAME)
        })
        .collect();
    artifacts.sort();
    assert_eq!(artifacts.len(), 2);
    let content = std::fs::read_to_string(&artifacts[0]).unwrap();
    assert!(content.starts_with("<!-- source: "));
    assert!(content.contains("<!-- source-created: "));
    assert!(content.contains("<!-- generated: "));
    assert!(content.ends_with("analysis output\n"));

    // The output directory holds exactly the artifacts and the two report
    // copies; nothing transient is left behind.
    assert_eq!(std::fs::read_dir(&fx.output).unwrap().count(), 4);

    // Both report copies exist.
    let latest = fx.output.join(format!("{}-latest.md", REPORT_BASENAME));
    assert!(latest.exists());
    let report = summary.report_path.unwrap();
    assert!(report.exists());
    assert_ne!(report, latest);
    assert_eq!(
        std::fs::read_to_string(&report).unwrap(),
        std::fs::read_to_string(&latest).unwrap()
    );

    let phases = sink.phases.lock().unwrap().clone();
    assert_eq!(
        phases,
        vec![
            Phase::Discovering,
            Phase::Analyzing,
            Phase::Reviewing,
            Phase::Done
        ]
    );
    assert!(sink.cleared.load(Ordering::SeqCst));
}

#[tokio::test]
async fn existing_artifact_is_skipped_but_still_reviewed() {
    let fx = fixture();
    let done_name = stamped_name(1, "done");
    write_transcript(&fx.transcripts, &done_name, &fx.scope);
    write_transcript(&fx.transcripts, &stamped_name(0, "todo"), &fx.scope);

    std::fs::create_dir_all(&fx.output).unwrap();
    let done_stem = done_name.trim_end_matches(".jsonl");
    std::fs::write(
        fx.output.join(format!("{}.md", done_stem)),
        "<!-- source: prior -->\n\nprior analysis\n",
    )
    .unwrap();

    let tool = fake_tool(&fx.tool_dir, "echo fresh analysis");
    let summary = Retro::new(options(&fx.output), &fx.transcripts, &fx.scope, tool)
        .run(Arc::new(RecordingSink::default()))
        .await
        .unwrap();

    assert_eq!(summary.in_scope, 2);
    assert_eq!(summary.skipped_existing, 1);
    assert_eq!(summary.selected, 1);
    assert_eq!(summary.succeeded, 1);
    // Review considers both the prior and the fresh artifact.
    assert_eq!(summary.considered, 2);
}

#[tokio::test]
async fn per_record_failures_do_not_abort_the_batch() {
    let fx = fixture();
    write_transcript(&fx.transcripts, &stamped_name(2, "good-one"), &fx.scope);
    write_transcript(&fx.transcripts, &stamped_name(1, "bad-apple"), &fx.scope);
    write_transcript(&fx.transcripts, &stamped_name(0, "good-two"), &fx.scope);

    // Fail only the record whose prompt mentions the bad transcript.
    let tool = fake_tool(
        &fx.tool_dir,
        "case \"$*\" in *bad-apple*) echo boom >&2; exit 2;; *) echo analysis;; esac",
    );
    let summary = Retro::new(options(&fx.output), &fx.transcripts, &fx.scope, tool)
        .run(Arc::new(RecordingSink::default()))
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures.len(), 1);
    assert!(summary.failures[0].0.contains("bad-apple"));
    assert!(summary.failures[0].1.contains("exit code 2"));
    assert!(summary.failures[0].1.contains("boom"));

    // Synthesis still ran over the two produced artifacts.
    assert_eq!(summary.considered, 2);
    assert!(summary.report_path.is_some());
}

#[tokio::test]
async fn synthesis_failure_reaches_done_without_report() {
    let fx = fixture();
    write_transcript(&fx.transcripts, &stamped_name(0, "only"), &fx.scope);

    // The review invocation is the one carrying --no-tools.
    let tool = fake_tool(
        &fx.tool_dir,
        "case \"$*\" in *--no-tools*) echo review-broke >&2; exit 1;; *) echo analysis;; esac",
    );
    let sink = Arc::new(RecordingSink::default());
    let summary = Retro::new(options(&fx.output), &fx.transcripts, &fx.scope, tool)
        .run(sink.clone())
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert!(summary.report_path.is_none());
    let error = summary.synthesis_error.unwrap();
    assert!(error.contains("code 1"));
    assert!(error.contains("review-broke"));

    assert!(!fx
        .output
        .join(format!("{}-latest.md", REPORT_BASENAME))
        .exists());

    let phases = sink.phases.lock().unwrap().clone();
    assert_eq!(*phases.last().unwrap(), Phase::Done);
}

#[tokio::test]
async fn empty_analysis_output_is_a_failure() {
    let fx = fixture();
    write_transcript(&fx.transcripts, &stamped_name(0, "silent"), &fx.scope);

    let tool = fake_tool(
        &fx.tool_dir,
        "case \"$*\" in *--no-tools*) echo report;; *) exit 0;; esac",
    );
    let summary = Retro::new(options(&fx.output), &fx.transcripts, &fx.scope, tool)
        .run(Arc::new(RecordingSink::default()))
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 1);
    assert!(summary.failures[0].1.contains("no output"));
    // No artifact, nothing for synthesis to consider.
    assert_eq!(summary.considered, 0);
    assert!(summary.report_path.is_none());
    assert!(summary.synthesis_error.is_none());
}

#[tokio::test]
async fn output_dir_creation_failure_still_reaches_done() {
    let fx = fixture();
    write_transcript(&fx.transcripts, &stamped_name(0, "one"), &fx.scope);

    // Occupy the output path with a plain file so directory creation fails.
    std::fs::write(&fx.output, "in the way").unwrap();

    let tool = fake_tool(&fx.tool_dir, "echo analysis");
    let sink = Arc::new(RecordingSink::default());
    let result = Retro::new(options(&fx.output), &fx.transcripts, &fx.scope, tool)
        .run(sink.clone())
        .await;

    assert!(result.is_err());
    let phases = sink.phases.lock().unwrap().clone();
    assert_eq!(*phases.last().unwrap(), Phase::Done);
    assert!(sink.cleared.load(Ordering::SeqCst));
}

#[tokio::test]
async fn no_work_path_still_reaches_done() {
    let fx = fixture();

    let tool = fake_tool(&fx.tool_dir, "echo analysis");
    let sink = Arc::new(RecordingSink::default());
    let summary = Retro::new(options(&fx.output), &fx.transcripts, &fx.scope, tool)
        .run(sink.clone())
        .await
        .unwrap();

    assert_eq!(summary.in_scope, 0);
    assert_eq!(summary.selected, 0);
    assert_eq!(summary.considered, 0);
    assert!(summary.report_path.is_none());

    let phases = sink.phases.lock().unwrap().clone();
    assert_eq!(*phases.last().unwrap(), Phase::Done);
    assert!(sink.cleared.load(Ordering::SeqCst));
}
