//! Pipeline orchestration and execution guard for the clipping system.
//!
//! This crate ties together collection, content extraction, scoring and the
//! store into one run ([`pipeline`]), and keeps runs exclusive and on
//! schedule ([`guard`]).

pub mod guard;
pub mod pipeline;

pub use guard::{
    GuardOutcome, LOCK_FILE_NAME, LockHandle, RunLock, Schedule, Scheduler, lock_path_for,
    run_guarded, shutdown_signal, spawn_signal_watcher,
};
pub use pipeline::{
    CollectStats, ExtractStats, Pipeline, PipelineLimits, ProgressReporter, RunFlag, RunSummary,
    ScoreStats, SilentProgress, run_once,
};
