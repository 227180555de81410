//! End-to-end clipping run: collect → extract → score → report.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use clipping_crawler::{
    ContentExtractor, HttpContentExtractor, SourceCollector, default_collectors,
};
use clipping_scoring::ScoringEngine;
use clipping_shared::{AppConfig, CollectionRun, Result, StoreStats};
use clipping_storage::Store;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Per-run work limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineLimits {
    /// Listing pages requested from each source.
    pub max_pages: u32,
    /// Items sent to the content extractor.
    pub max_extraction: u32,
    /// Items scored.
    pub max_scoring: u32,
}

impl From<&AppConfig> for PipelineLimits {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_pages: config.collection.max_pages_per_source,
            max_extraction: config.extraction.max_per_run,
            max_scoring: config.scoring.max_per_run,
        }
    }
}

// ---------------------------------------------------------------------------
// Run flag
// ---------------------------------------------------------------------------

/// Shared stop flag, checked between sources and between items.
#[derive(Debug, Clone, Default)]
pub struct RunFlag {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl RunFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder of this flag to stop.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Resolves once [`stop`](Self::stop) has been called.
    pub async fn stopped(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before each item of the extraction and scoring stages.
    fn item(&self, current: usize, total: usize);
    /// Called once with the final summary.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item(&self, _current: usize, _total: usize) {}
    fn done(&self, _summary: &RunSummary) {}
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectStats {
    pub sources: u32,
    pub sources_failed: u32,
    pub collected: u32,
    pub new_items: u32,
    pub duplicates: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractStats {
    pub attempted: u32,
    /// Pages whose text met the success rule.
    pub succeeded: u32,
    /// Pages fetched but without usable text.
    pub unsuccessful: u32,
    /// Fetch or write errors; nothing was stored for these.
    pub failed: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreStats {
    pub attempted: u32,
    pub scored: u32,
    /// Scored items with an interest score above zero.
    pub relevant: u32,
    pub failed: u32,
    /// Set when the stage did not run, with the reason.
    pub skipped: Option<String>,
}

/// Report of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub limits: PipelineLimits,
    pub collect: CollectStats,
    pub extract: ExtractStats,
    pub score: ScoreStats,
    pub before: Option<StoreStats>,
    pub after: Option<StoreStats>,
    pub success: bool,
    pub interrupted: bool,
    pub error: Option<String>,
}

impl RunSummary {
    fn new(limits: PipelineLimits) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::now_v7(),
            started_at: now,
            finished_at: now,
            elapsed_secs: 0.0,
            limits,
            collect: CollectStats::default(),
            extract: ExtractStats::default(),
            score: ScoreStats::default(),
            before: None,
            after: None,
            success: false,
            interrupted: false,
            error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Sequential clipping pipeline over one store.
pub struct Pipeline<'a> {
    store: &'a Store,
    engine: &'a ScoringEngine,
    collectors: Vec<Box<dyn SourceCollector>>,
    extractor: Box<dyn ContentExtractor>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        store: &'a Store,
        engine: &'a ScoringEngine,
        collectors: Vec<Box<dyn SourceCollector>>,
        extractor: Box<dyn ContentExtractor>,
    ) -> Self {
        Self {
            store,
            engine,
            collectors,
            extractor,
        }
    }

    /// Pipeline with the built-in collectors and the HTTP extractor.
    pub fn from_config(
        store: &'a Store,
        engine: &'a ScoringEngine,
        config: &AppConfig,
    ) -> Result<Self> {
        Ok(Self::new(
            store,
            engine,
            default_collectors(&config.collection)?,
            Box::new(HttpContentExtractor::new(&config.collection)),
        ))
    }

    /// Execute one run. Never returns an error: failures are reported in the
    /// summary. The extractor session is closed on every path.
    #[instrument(skip_all, fields(
        max_pages = limits.max_pages,
        max_extraction = limits.max_extraction,
        max_scoring = limits.max_scoring,
    ))]
    pub async fn run(
        &self,
        limits: PipelineLimits,
        progress: &dyn ProgressReporter,
        flag: &RunFlag,
    ) -> RunSummary {
        let start = Instant::now();
        let mut summary = RunSummary::new(limits);
        info!(run_id = %summary.run_id, "starting clipping run");

        let outcome = self.run_stages(&limits, progress, flag, &mut summary).await;
        self.extractor.close();

        match outcome {
            Ok(()) => summary.success = true,
            Err(e) => {
                error!(error = %e, "pipeline failed");
                summary.error = Some(e.to_string());
            }
        }

        progress.phase("Reporting");
        summary.after = match self.store.stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(error = %e, "failed to read final store stats");
                None
            }
        };
        summary.finished_at = Utc::now();
        summary.elapsed_secs = start.elapsed().as_secs_f64();

        progress.done(&summary);
        info!(
            run_id = %summary.run_id,
            success = summary.success,
            interrupted = summary.interrupted,
            new_items = summary.collect.new_items,
            extracted = summary.extract.succeeded,
            scored = summary.score.scored,
            relevant = summary.score.relevant,
            elapsed_ms = start.elapsed().as_millis(),
            "clipping run complete"
        );

        summary
    }

    async fn run_stages(
        &self,
        limits: &PipelineLimits,
        progress: &dyn ProgressReporter,
        flag: &RunFlag,
        summary: &mut RunSummary,
    ) -> Result<()> {
        progress.phase("Initializing");
        let before = self.store.stats().await?;
        info!(total_items = before.total_items, "store state before run");
        summary.before = Some(before);

        self.collect(limits.max_pages, progress, flag, summary).await;
        if summary.interrupted {
            return Ok(());
        }

        self.extract(limits.max_extraction, progress, flag, summary)
            .await?;
        if summary.interrupted {
            return Ok(());
        }

        self.score(limits.max_scoring, progress, flag, summary).await
    }

    // --- Collect ---

    async fn collect(
        &self,
        max_pages: u32,
        progress: &dyn ProgressReporter,
        flag: &RunFlag,
        summary: &mut RunSummary,
    ) {
        for collector in &self.collectors {
            if flag.is_stopped() {
                warn!("stop requested, skipping remaining sources");
                summary.interrupted = true;
                break;
            }

            let code = collector.code().to_string();
            progress.phase(&format!("Collecting {code}"));
            let start = Instant::now();

            let run = match self.collect_source(collector.as_ref(), max_pages).await {
                Ok((collected, new_items)) => {
                    let run = CollectionRun::success(
                        &code,
                        collected,
                        new_items,
                        start.elapsed().as_secs_f64(),
                    );
                    info!(
                        source = %code,
                        collected,
                        new_items,
                        duplicates = run.duplicates,
                        "source collected"
                    );
                    summary.collect.collected += collected;
                    summary.collect.new_items += new_items;
                    summary.collect.duplicates += run.duplicates;
                    run
                }
                Err(e) => {
                    warn!(source = %code, error = %e, "source failed");
                    summary.collect.sources_failed += 1;
                    CollectionRun::failure(&code, start.elapsed().as_secs_f64(), e.to_string())
                }
            };
            summary.collect.sources += 1;

            self.store.record_run(&run).await;
            collector.close();
        }
    }

    /// Returns `(collected, new)` for one source.
    async fn collect_source(
        &self,
        collector: &dyn SourceCollector,
        max_pages: u32,
    ) -> Result<(u32, u32)> {
        let items = collector.collect(max_pages).await?;
        let mut new_items = 0u32;
        for item in &items {
            let (id, is_new) = self.store.insert_item(item).await?;
            if is_new {
                debug!(id, link = %item.link, "new item");
                new_items += 1;
            }
        }
        Ok((items.len() as u32, new_items))
    }

    // --- Extract ---

    async fn extract(
        &self,
        limit: u32,
        progress: &dyn ProgressReporter,
        flag: &RunFlag,
        summary: &mut RunSummary,
    ) -> Result<()> {
        progress.phase("Extracting content");
        let pending = self.store.items_needing_extraction(limit).await?;
        if pending.is_empty() {
            info!("no items need extraction");
            return Ok(());
        }

        let total = pending.len();
        info!(total, "extracting content");

        for (i, item) in pending.iter().enumerate() {
            if flag.is_stopped() {
                warn!("stop requested, skipping remaining extractions");
                summary.interrupted = true;
                break;
            }
            progress.item(i + 1, total);
            summary.extract.attempted += 1;

            let result = match self.extractor.extract(&item.link).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(id = item.id, link = %item.link, error = %e, "extraction failed");
                    summary.extract.failed += 1;
                    continue;
                }
            };

            if let Err(e) = self.store.update_content(item.id, &result).await {
                warn!(id = item.id, error = %e, "failed to store extracted content");
                summary.extract.failed += 1;
                continue;
            }

            if result.success {
                summary.extract.succeeded += 1;
            } else {
                debug!(id = item.id, words = result.word_count, "no usable content");
                summary.extract.unsuccessful += 1;
            }
        }

        info!(
            succeeded = summary.extract.succeeded,
            attempted = summary.extract.attempted,
            "extraction stage done"
        );
        Ok(())
    }

    // --- Score ---

    async fn score(
        &self,
        limit: u32,
        progress: &dyn ProgressReporter,
        flag: &RunFlag,
        summary: &mut RunSummary,
    ) -> Result<()> {
        progress.phase("Scoring");
        if !self.engine.is_available() {
            let reason = "scoring dictionary not available".to_string();
            warn!("{reason}, skipping scoring stage");
            summary.score.skipped = Some(reason);
            return Ok(());
        }

        let pending = self.store.items_needing_scoring(limit).await?;
        if pending.is_empty() {
            info!("no items need scoring");
            return Ok(());
        }

        let total = pending.len();
        info!(total, "scoring items");

        for (i, item) in pending.iter().enumerate() {
            if flag.is_stopped() {
                warn!("stop requested, skipping remaining scoring");
                summary.interrupted = true;
                break;
            }
            progress.item(i + 1, total);
            summary.score.attempted += 1;

            let body = item.content.as_deref().unwrap_or_default();
            let result = self.engine.score(&item.title, body);

            if let Err(e) = self.store.upsert_scoring(item.id, &result).await {
                warn!(id = item.id, error = %e, "failed to store scoring");
                summary.score.failed += 1;
                continue;
            }

            summary.score.scored += 1;
            if result.interest_score > 0.0 {
                summary.score.relevant += 1;
            }
            debug!(
                id = item.id,
                interest = result.interest_score,
                relevance = %result.relevance,
                "item scored"
            );
        }

        info!(
            relevant = summary.score.relevant,
            scored = summary.score.scored,
            "scoring stage done"
        );
        Ok(())
    }
}

/// Open the store at `db_path`, load the dictionary and run the default
/// pipeline once.
pub async fn run_once(
    config: &AppConfig,
    db_path: &Path,
    limits: PipelineLimits,
    progress: &dyn ProgressReporter,
    flag: &RunFlag,
) -> Result<RunSummary> {
    let store = Store::open(db_path).await?;
    let engine = ScoringEngine::from_path_or_empty(&config.scoring.dictionary_file);
    let pipeline = Pipeline::from_config(&store, &engine, config)?;
    Ok(pipeline.run(limits, progress, flag).await)
}
