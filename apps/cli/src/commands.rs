//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use clipping_core::{
    GuardOutcome, PipelineLimits, ProgressReporter, RunFlag, RunSummary, Schedule, Scheduler,
    SilentProgress, lock_path_for, run_guarded, run_once, spawn_signal_watcher,
};
use clipping_shared::{AppConfig, ItemId, init_config, resolve_config};
use clipping_storage::Store;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Legislative news clipping: collect, extract, score.
#[derive(Parser)]
#[command(
    name = "clipping",
    version,
    about = "Collect legislative news, extract article text and score it against a weighted dictionary.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.clipping/clipping.toml).
    #[arg(long, global = true, env = "CLIPPING_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the pipeline once.
    Run {
        /// Listing pages per source.
        #[arg(long)]
        max_pages: Option<u32>,

        /// Items to extract in this run.
        #[arg(long)]
        max_extraction: Option<u32>,

        /// Items to score in this run.
        #[arg(long)]
        max_scoring: Option<u32>,

        /// Run even outside the scheduled window.
        #[arg(long)]
        force: bool,

        /// Run against a scratch database that is deleted afterwards.
        #[arg(long)]
        dry_run: bool,
    },

    /// Run the pipeline at the configured weekday times.
    Schedule {
        /// Perform one guarded run now and exit.
        #[arg(long)]
        run_now: bool,
    },

    /// Print store statistics and recent collection runs as JSON.
    Stats {
        /// Number of recent collection runs to include.
        #[arg(long, default_value = "10")]
        runs: u32,
    },

    /// Mark a news item as favorite (kept by prune).
    Favorite {
        id: ItemId,

        /// Remove the mark instead.
        #[arg(long)]
        unset: bool,
    },

    /// Delete non-favorite items older than the retention period.
    Prune {
        /// Retention in days (defaults to retention.days).
        #[arg(long)]
        days: Option<u32>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "clipping=info",
        1 => "clipping=debug",
        _ => "clipping=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run {
            max_pages,
            max_extraction,
            max_scoring,
            force,
            dry_run,
        } => {
            let config = resolve_config(config_path)?;
            let mut limits = PipelineLimits::from(&config);
            limits.max_pages = max_pages.unwrap_or(limits.max_pages);
            limits.max_extraction = max_extraction.unwrap_or(limits.max_extraction);
            limits.max_scoring = max_scoring.unwrap_or(limits.max_scoring);
            cmd_run(&config, limits, force, dry_run).await
        }
        Command::Schedule { run_now } => {
            let config = resolve_config(config_path)?;
            cmd_schedule(&config, run_now).await
        }
        Command::Stats { runs } => {
            let config = resolve_config(config_path)?;
            cmd_stats(&config, runs).await.map(|()| ExitCode::SUCCESS)
        }
        Command::Favorite { id, unset } => {
            let config = resolve_config(config_path)?;
            cmd_favorite(&config, id, !unset).await.map(|()| ExitCode::SUCCESS)
        }
        Command::Prune { days } => {
            let config = resolve_config(config_path)?;
            cmd_prune(&config, days).await.map(|()| ExitCode::SUCCESS)
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().map(|()| ExitCode::SUCCESS),
            ConfigAction::Show => {
                cmd_config_show(config_path).map(|()| ExitCode::SUCCESS)
            }
        },
    }
}

// ---------------------------------------------------------------------------
// run / schedule
// ---------------------------------------------------------------------------

async fn cmd_run(
    config: &AppConfig,
    limits: PipelineLimits,
    force: bool,
    dry_run: bool,
) -> Result<ExitCode> {
    if !force {
        let schedule = Schedule::from_config(&config.schedule)?;
        if !schedule.within_window(Utc::now()) {
            info!("outside the scheduled window, skipping (use --force to run anyway)");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let scratch_dir = dry_run
        .then(|| std::env::temp_dir().join(format!("clipping_dry_run_{}", Uuid::now_v7())));
    let db_path = match &scratch_dir {
        Some(dir) => {
            info!(path = %dir.display(), "dry run, using a scratch database");
            dir.join("clipping.db")
        }
        None => config.storage.database_path.clone(),
    };

    let outcome = guarded_run(config, &db_path, limits, &CliProgress::new()).await;

    if let Some(dir) = scratch_dir {
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            warn!(path = %dir.display(), error = %e, "failed to remove scratch database");
        }
    }

    Ok(exit_code(outcome?))
}

async fn cmd_schedule(config: &AppConfig, run_now: bool) -> Result<ExitCode> {
    let db_path = config.storage.database_path.clone();

    let schedule = Schedule::from_config(&config.schedule)?;

    if run_now {
        if !schedule.is_business_day(Utc::now()) {
            info!("today is not a scheduled weekday, skipping");
            return Ok(ExitCode::SUCCESS);
        }
        let outcome = guarded_run(config, &db_path, PipelineLimits::from(config), &SilentProgress)
            .await?;
        return Ok(exit_code(outcome));
    }

    if !config.schedule.enabled {
        return Err(eyre!(
            "scheduling is disabled (set schedule.enabled = true or use `clipping run`)"
        ));
    }

    let limits = PipelineLimits::from(config);
    let flag = RunFlag::new();
    let watcher = spawn_signal_watcher(flag.clone());

    let mut scheduler = Scheduler::new(schedule, lock_path_for(&db_path));
    let (db_path, job_flag) = (&db_path, &flag);
    scheduler
        .run_forever(&flag, move || async move {
            match run_once(config, db_path, limits, &SilentProgress, job_flag).await {
                Ok(summary) => log_summary(&summary),
                Err(e) => error!(error = %e, "scheduled run failed to start"),
            }
        })
        .await;

    watcher.abort();
    Ok(ExitCode::SUCCESS)
}

/// Run the pipeline once under the run lock, with a signal watcher.
async fn guarded_run(
    config: &AppConfig,
    db_path: &Path,
    limits: PipelineLimits,
    progress: &dyn ProgressReporter,
) -> Result<GuardOutcome<clipping_shared::Result<RunSummary>>> {
    let flag = RunFlag::new();
    let watcher = spawn_signal_watcher(flag.clone());
    let outcome = run_guarded(
        &lock_path_for(db_path),
        &flag,
        run_once(config, db_path, limits, progress, &flag),
    )
    .await;
    watcher.abort();
    Ok(outcome?)
}

fn exit_code(outcome: GuardOutcome<clipping_shared::Result<RunSummary>>) -> ExitCode {
    match outcome {
        GuardOutcome::Skipped => ExitCode::SUCCESS,
        GuardOutcome::Completed(Ok(summary)) => {
            log_summary(&summary);
            print_summary(&summary);
            if summary.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        GuardOutcome::Completed(Err(e)) => {
            error!(error = %e, "pipeline could not start");
            ExitCode::FAILURE
        }
    }
}

fn log_summary(summary: &RunSummary) {
    if summary.success {
        info!(
            run_id = %summary.run_id,
            collected = summary.collect.collected,
            new_items = summary.collect.new_items,
            extracted = summary.extract.attempted,
            scored = summary.score.scored,
            elapsed_secs = summary.elapsed_secs,
            "run succeeded"
        );
    } else {
        error!(
            run_id = %summary.run_id,
            error = summary.error.as_deref().unwrap_or("unknown"),
            elapsed_secs = summary.elapsed_secs,
            "run failed"
        );
    }
}

fn print_summary(summary: &RunSummary) {
    let total = |stats: &Option<clipping_shared::StoreStats>| {
        stats.as_ref().map_or("?".to_string(), |s| s.total_items.to_string())
    };

    println!();
    if summary.success {
        println!("  Run completed{}", if summary.interrupted { " (interrupted)" } else { "" });
    } else {
        println!("  Run failed: {}", summary.error.as_deref().unwrap_or("unknown error"));
    }
    println!("  Run:        {}", summary.run_id);
    println!(
        "  Collected:  {} ({} new, {} duplicates, {}/{} sources failed)",
        summary.collect.collected,
        summary.collect.new_items,
        summary.collect.duplicates,
        summary.collect.sources_failed,
        summary.collect.sources
    );
    println!(
        "  Extracted:  {}/{} ({} failed)",
        summary.extract.succeeded, summary.extract.attempted, summary.extract.failed
    );
    match &summary.score.skipped {
        Some(reason) => println!("  Scoring:    skipped ({reason})"),
        None => println!(
            "  Scoring:    {}/{} relevant",
            summary.score.relevant, summary.score.scored
        ),
    }
    println!("  Items:      {} -> {}", total(&summary.before), total(&summary.after));
    println!("  Time:       {:.1}s", summary.elapsed_secs);
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item(&self, current: usize, total: usize) {
        let phase = self.spinner.message();
        let phase = phase.split(" [").next().unwrap_or_default().to_string();
        self.spinner.set_message(format!("{phase} [{current}/{total}]"));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Maintenance commands
// ---------------------------------------------------------------------------

async fn cmd_stats(config: &AppConfig, runs: u32) -> Result<()> {
    let store = Store::open_readonly(&config.storage.database_path).await?;
    let stats = store.stats().await?;
    let recent = store.recent_runs(runs).await?;

    let report = serde_json::json!({
        "database": config.storage.database_path,
        "stats": stats,
        "recent_runs": recent,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_favorite(config: &AppConfig, id: ItemId, favorite: bool) -> Result<()> {
    let store = Store::open(&config.storage.database_path).await?;
    store.set_favorite(id, favorite).await?;
    info!(id, favorite, "favorite updated");
    println!(
        "Item {id} {}",
        if favorite { "marked as favorite" } else { "unmarked" }
    );
    Ok(())
}

async fn cmd_prune(config: &AppConfig, days: Option<u32>) -> Result<()> {
    let days = days.unwrap_or(config.retention.days);
    let store = Store::open(&config.storage.database_path).await?;
    let deleted = store.prune_older_than(days).await?;
    println!("Pruned {deleted} items older than {days} days");
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(explicit: Option<&Path>) -> Result<()> {
    let config = resolve_config(explicit)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
