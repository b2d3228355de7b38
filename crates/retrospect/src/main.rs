use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use log::error;

use retrospect::{
    render, short_status, Phase, ProgressSnapshot, Retro, RetroOptions, StatusSink,
};

/// Batch retrospective over session transcripts: analyze each in-scope
/// transcript with the external analysis tool, then synthesize one
/// improvement report from all artifacts.
///
/// Unrecognized flags and unparseable values are ignored in favor of
/// defaults; a bad flag never aborts a batch.
#[derive(Parser, Debug)]
#[command(name = "retro", version, about, ignore_errors = true)]
struct Cli {
    /// Directory containing session transcript files.
    transcripts_dir: PathBuf,

    /// Repository root that transcripts must belong to.
    #[arg(long, default_value = ".")]
    scope_root: PathBuf,

    /// Lookback window in days (1-90; out-of-range values use the default).
    #[arg(long, default_value_t = retrospect::options::DEFAULT_DAYS)]
    days: u32,

    /// Concurrent analysis processes (1-16).
    #[arg(long, default_value_t = retrospect::options::DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Per-task timeout in minutes (1-60).
    #[arg(long, default_value_t = retrospect::options::DEFAULT_TIMEOUT_MINUTES)]
    timeout_minutes: u64,

    /// Artifact and report directory, relative to the scope root.
    #[arg(long, default_value = retrospect::options::DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Cap on newly analyzed records (oldest first).
    #[arg(long)]
    limit: Option<usize>,

    /// Discover and report counts without analyzing anything.
    #[arg(long)]
    dry_run: bool,

    /// External analysis executable.
    #[arg(long, default_value = "claude")]
    tool: String,
}

/// Prints the short status line on change and the full view at phase
/// transitions.
#[derive(Default)]
struct TerminalSink {
    last: Mutex<(Option<Phase>, String)>,
}

impl StatusSink for TerminalSink {
    fn update(&self, snapshot: &ProgressSnapshot) {
        let status = short_status(snapshot);
        let mut last = self.last.lock().expect("terminal sink mutex");

        if last.0 != Some(snapshot.phase) {
            last.0 = Some(snapshot.phase);
            for line in render(snapshot) {
                eprintln!("{}", line);
            }
        } else if last.1 != status {
            eprintln!("  {}", status);
        }
        last.1 = status;
    }
}

fn init_logging() {
    let _ = tracing_log::LogTracer::init();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_flags_fall_back_to_defaults() {
        let cli = Cli::try_parse_from([
            "retro",
            "/tmp/transcripts",
            "--days",
            "30",
            "--bogus-flag",
        ])
        .unwrap();

        assert_eq!(cli.transcripts_dir, PathBuf::from("/tmp/transcripts"));
        assert_eq!(cli.days, 30);
        assert_eq!(cli.concurrency, retrospect::options::DEFAULT_CONCURRENCY);
    }

    #[test]
    fn test_unparseable_value_falls_back_to_default() {
        let cli = Cli::try_parse_from(["retro", "/tmp/transcripts", "--days", "soon"]).unwrap();

        assert_eq!(cli.days, retrospect::options::DEFAULT_DAYS);
    }
}

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();
    let options = RetroOptions {
        days: cli.days,
        concurrency: cli.concurrency,
        timeout_minutes: cli.timeout_minutes,
        output_dir: cli.output_dir,
        limit: cli.limit,
        dry_run: cli.dry_run,
    }
    .clamped();

    let retro = Retro::new(options, cli.transcripts_dir, cli.scope_root, cli.tool);

    match retro.run(Arc::new(TerminalSink::default())).await {
        Ok(summary) => {
            println!("{}", summary.notification());
            if summary.synthesis_error.is_some() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("Run failed: {}", e);
            std::process::exit(1);
        }
    }
}
