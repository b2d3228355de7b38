use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use log::debug;

pub const DEFAULT_DAYS: u32 = 7;
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 12;
pub const DEFAULT_OUTPUT_DIR: &str = "reports/retro/session-analyses";

const DAYS_RANGE: RangeInclusive<u32> = 1..=90;
const CONCURRENCY_RANGE: RangeInclusive<usize> = 1..=16;
const TIMEOUT_RANGE: RangeInclusive<u64> = 1..=60;

/// Options for one retrospective run.
///
/// Out-of-range values are replaced with defaults by [`RetroOptions::clamped`]
/// rather than rejected. This leniency is deliberate: a bad flag value should
/// never abort a batch that would otherwise run fine.
#[derive(Debug, Clone)]
pub struct RetroOptions {
    /// Lookback window in days (1-90).
    pub days: u32,
    /// Maximum number of concurrently running analysis processes (1-16).
    pub concurrency: usize,
    /// Per-task wall-clock timeout in minutes (1-60).
    pub timeout_minutes: u64,
    /// Artifact and report directory; relative paths resolve against the scope root.
    pub output_dir: PathBuf,
    /// Optional cap on newly analyzed records (oldest first, applied after sorting).
    pub limit: Option<usize>,
    /// Discover and report counts without running any analysis.
    pub dry_run: bool,
}

impl Default for RetroOptions {
    fn default() -> Self {
        Self {
            days: DEFAULT_DAYS,
            concurrency: DEFAULT_CONCURRENCY,
            timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            limit: None,
            dry_run: false,
        }
    }
}

impl RetroOptions {
    /// Returns a copy with every out-of-range value replaced by its default.
    pub fn clamped(mut self) -> Self {
        self.days = replace_out_of_range("days", self.days, DAYS_RANGE, DEFAULT_DAYS);
        self.concurrency = replace_out_of_range(
            "concurrency",
            self.concurrency,
            CONCURRENCY_RANGE,
            DEFAULT_CONCURRENCY,
        );
        self.timeout_minutes = replace_out_of_range(
            "timeout_minutes",
            self.timeout_minutes,
            TIMEOUT_RANGE,
            DEFAULT_TIMEOUT_MINUTES,
        );
        self
    }

    /// Per-task timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes * 60)
    }
}

fn replace_out_of_range<T: PartialOrd + Copy + std::fmt::Display>(
    name: &str,
    value: T,
    range: RangeInclusive<T>,
    default: T,
) -> T {
    if range.contains(&value) {
        value
    } else {
        debug!("Ignoring out-of-range {} = {}, using {}", name, value, default);
        default
    }
}
