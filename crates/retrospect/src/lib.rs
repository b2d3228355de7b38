pub mod driver;
pub mod error;
pub mod options;
pub mod pool;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod scanner;
pub mod supervisor;

pub use driver::{Retro, RunSummary, TaskResult, REPORT_BASENAME};
pub use error::{Result, RetroError};
pub use options::RetroOptions;
pub use pool::{run_pool, NoopObserver, PoolObserver};
pub use progress::{render, short_status, NoopSink, Phase, ProgressSnapshot, StatusSink};
pub use record::{Discovery, Record};
pub use supervisor::ExecOutcome;
