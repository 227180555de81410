//! Execution guard: single-run lock file, shutdown signals and the weekday
//! scheduler.
//!
//! Cross-process exclusion is a PID lock file next to the database. A lock
//! whose PID no longer names a live process is stale and is replaced. The
//! lock is released on normal completion, on error paths (via `Drop`) and
//! from the shutdown watcher.

use std::fs::{self, OpenOptions};
use std::future::Future;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeDelta, TimeZone, Timelike, Utc,
    Weekday,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use clipping_shared::{ClippingError, Result, ScheduleConfig};

use crate::pipeline::RunFlag;

/// File name of the lock, created beside the database.
pub const LOCK_FILE_NAME: &str = "automation.lock";

/// Lock path for the database at `db_path`.
pub fn lock_path_for(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(LOCK_FILE_NAME)
}

// ---------------------------------------------------------------------------
// Lock file
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn process_alive(pid: i32) -> bool {
    // SAFETY: signal 0 performs only the existence and permission check.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: i32) -> bool {
    true
}

/// PID recorded in a lock file, if it names a plausible live process.
fn live_holder(content: &str) -> Option<i32> {
    let pid = content.trim().parse::<i32>().ok()?;
    (pid > 0 && process_alive(pid)).then_some(pid)
}

struct LockInner {
    path: PathBuf,
    pid: u32,
    released: AtomicBool,
}

/// Cloneable handle that can release a [`RunLock`] from another task.
#[derive(Clone)]
pub struct LockHandle {
    inner: Arc<LockInner>,
}

impl LockHandle {
    /// Remove the lock file if it still holds our PID. Idempotent.
    pub fn release(&self) {
        if self.inner.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let path = &self.inner.path;
        match fs::read_to_string(path) {
            Ok(content) if content.trim() == self.inner.pid.to_string() => {
                match fs::remove_file(path) {
                    Ok(()) => debug!(path = %path.display(), "lock released"),
                    Err(e) => warn!(path = %path.display(), error = %e, "failed to remove lock"),
                }
            }
            Ok(_) => warn!(path = %path.display(), "lock now held by another process, leaving it"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to read lock"),
        }
    }

}

/// An acquired run lock. Dropping it releases the lock.
pub struct RunLock {
    handle: LockHandle,
}

impl RunLock {
    /// Try to take the lock at `path`.
    ///
    /// Returns `Ok(None)` when another live process holds it. Stale locks
    /// (dead or unparsable PID) are removed first.
    pub fn acquire(path: &Path) -> Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ClippingError::io(parent, e))?;
            }
        }

        match fs::read_to_string(path) {
            Ok(content) => {
                if let Some(pid) = live_holder(&content) {
                    info!(pid, path = %path.display(), "lock held by a running process");
                    return Ok(None);
                }
                warn!(path = %path.display(), holder = content.trim(), "removing stale lock");
                match fs::remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(ClippingError::io(path, e)),
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(ClippingError::io(path, e)),
        }

        let pid = std::process::id();
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                info!(path = %path.display(), "lost lock race to another process");
                return Ok(None);
            }
            Err(e) => return Err(ClippingError::io(path, e)),
        };
        file.write_all(pid.to_string().as_bytes())
            .map_err(|e| ClippingError::io(path, e))?;

        debug!(pid, path = %path.display(), "lock acquired");
        Ok(Some(Self {
            handle: LockHandle {
                inner: Arc::new(LockInner {
                    path: path.to_path_buf(),
                    pid,
                    released: AtomicBool::new(false),
                }),
            },
        }))
    }

    pub fn path(&self) -> &Path {
        &self.handle.inner.path
    }

    pub fn handle(&self) -> LockHandle {
        self.handle.clone()
    }

    pub fn release(&self) {
        self.handle.release();
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        self.handle.release();
    }
}

// ---------------------------------------------------------------------------
// Guarded execution
// ---------------------------------------------------------------------------

/// Result of [`run_guarded`].
#[derive(Debug, PartialEq, Eq)]
pub enum GuardOutcome<T> {
    /// Another run holds the lock; `job` was never polled.
    Skipped,
    Completed(T),
}

/// Run `job` while holding the lock at `lock_path`.
///
/// The lock is released when `job` finishes or as soon as `flag` is stopped.
pub async fn run_guarded<F, T>(lock_path: &Path, flag: &RunFlag, job: F) -> Result<GuardOutcome<T>>
where
    F: Future<Output = T>,
{
    let Some(lock) = RunLock::acquire(lock_path)? else {
        info!("another run is in progress, skipping");
        return Ok(GuardOutcome::Skipped);
    };

    let releaser = release_on_stop(flag.clone(), lock.handle());
    let output = job.await;
    releaser.abort();
    lock.release();

    Ok(GuardOutcome::Completed(output))
}

/// Release `handle` once `flag` is stopped.
fn release_on_stop(flag: RunFlag, handle: LockHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        flag.stopped().await;
        handle.release();
    })
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C"),
        _ = terminate => info!("received SIGTERM"),
    }
}

/// Stop `flag` when a shutdown signal arrives.
pub fn spawn_signal_watcher(flag: RunFlag) -> JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("shutdown requested, finishing current item");
        flag.stop();
    })
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// Weekday trigger times in a fixed UTC offset.
#[derive(Debug, Clone)]
pub struct Schedule {
    weekdays: Vec<Weekday>,
    times: Vec<NaiveTime>,
    offset: FixedOffset,
    window: TimeDelta,
}

impl Schedule {
    pub fn new(
        weekdays: Vec<Weekday>,
        mut times: Vec<NaiveTime>,
        offset: FixedOffset,
        window: TimeDelta,
    ) -> Self {
        times.sort();
        times.dedup();
        Self {
            weekdays,
            times,
            offset,
            window,
        }
    }

    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600).ok_or_else(|| {
            ClippingError::config(format!(
                "utc_offset_hours {} out of range",
                config.utc_offset_hours
            ))
        })?;
        Ok(Self::new(
            config.parsed_weekdays()?,
            config.parsed_times()?,
            offset,
            TimeDelta::minutes(i64::from(config.window_minutes)),
        ))
    }

    fn allows(&self, day: Weekday) -> bool {
        self.weekdays.contains(&day)
    }

    /// Whether the local date of `now` is one of the scheduled weekdays.
    pub fn is_business_day(&self, now: DateTime<Utc>) -> bool {
        self.allows(now.with_timezone(&self.offset).weekday())
    }

    /// Weekday allowed and `HH:MM` of `now` equals a trigger time.
    pub fn is_trigger(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset);
        self.allows(local.weekday())
            && self
                .times
                .iter()
                .any(|t| t.hour() == local.hour() && t.minute() == local.minute())
    }

    /// Latest trigger of the local day that has passed but is less than one
    /// window old, keyed by date.
    fn latest_due(&self, now: DateTime<Utc>) -> Option<(NaiveDate, NaiveTime)> {
        let local = now.with_timezone(&self.offset);
        if !self.allows(local.weekday()) {
            return None;
        }
        let today = local.date_naive();
        let clock = local.naive_local();
        self.times
            .iter()
            .rev()
            .copied()
            .find(|t| {
                let trigger = today.and_time(*t);
                trigger <= clock && clock < trigger + self.window
            })
            .map(|t| (today, t))
    }

    /// Whether `now` falls in `[trigger - window, trigger + window)` for a
    /// trigger on an allowed weekday.
    pub fn within_window(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset);
        if !self.allows(local.weekday()) {
            return false;
        }
        let clock = local.naive_local();
        self.times.iter().any(|t| {
            let trigger = local.date_naive().and_time(*t);
            clock >= trigger - self.window && clock < trigger + self.window
        })
    }

    /// Next trigger strictly after `now`, within the coming week.
    pub fn next_trigger(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = now.with_timezone(&self.offset);
        (0..=7)
            .filter_map(|days| local.date_naive().checked_add_days(chrono::Days::new(days)))
            .filter(|date| self.allows(date.weekday()))
            .flat_map(|date| self.times.iter().map(move |t| date.and_time(*t)))
            .filter_map(|naive| self.offset.from_local_datetime(&naive).single())
            .find(|candidate| *candidate > local)
            .map(|dt| dt.with_timezone(&Utc))
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Long-running loop that fires a job at each schedule trigger.
pub struct Scheduler {
    schedule: Schedule,
    lock_path: PathBuf,
    tick: Duration,
    last_fired: Option<(NaiveDate, NaiveTime)>,
}

impl Scheduler {
    pub fn new(schedule: Schedule, lock_path: PathBuf) -> Self {
        Self {
            schedule,
            lock_path,
            tick: Duration::from_secs(60),
            last_fired: None,
        }
    }

    /// Override the polling interval.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// True once per (date, trigger), on the first tick at or after the
    /// trigger and before its window closes. Late ticks still fire.
    fn due(&mut self, now: DateTime<Utc>) -> bool {
        let Some(key) = self.schedule.latest_due(now) else {
            return false;
        };
        if self.last_fired.is_some_and(|fired| fired >= key) {
            return false;
        }
        self.last_fired = Some(key);
        true
    }

    /// Treat a trigger that already passed when the loop starts as fired.
    fn prime(&mut self, now: DateTime<Utc>) {
        if let Some(key) = self.schedule.latest_due(now) {
            self.last_fired = Some(key);
        }
    }

    /// Poll until `flag` is stopped, running `job` under the run lock at each
    /// trigger. Returns the number of jobs that ran.
    pub async fn run_forever<F, Fut>(&mut self, flag: &RunFlag, mut job: F) -> u32
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        info!(
            times = ?self.schedule.times,
            weekdays = ?self.schedule.weekdays,
            next = ?self.schedule.next_trigger(Utc::now()),
            "scheduler started"
        );

        self.prime(Utc::now());
        let mut ticker = tokio::time::interval(self.tick);
        let mut completed = 0u32;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = flag.stopped() => break,
            }

            if !self.due(Utc::now()) {
                continue;
            }

            info!("scheduled run starting");
            match run_guarded(&self.lock_path, flag, job()).await {
                Ok(GuardOutcome::Completed(())) => {
                    completed += 1;
                    info!(next = ?self.schedule.next_trigger(Utc::now()), "scheduled run finished");
                }
                Ok(GuardOutcome::Skipped) => {}
                Err(e) => error!(error = %e, "scheduled run could not start"),
            }

            if flag.is_stopped() {
                break;
            }
        }

        info!(completed, "scheduler stopped");
        completed
    }
}
