//! libSQL storage layer for the clipping pipeline (local file mode).
//!
//! The [`Store`] struct wraps a libSQL database holding news items, their
//! scoring results and the per-source collection log.
//!
//! **Access rules:**
//! - pipeline runs and maintenance commands: read-write via [`Store::open`]
//! - reporting (`stats`): read-only via [`Store::open_readonly`]
//!
//! Items are deduplicated by `link`. Scoring rows are replaced with a
//! delete-then-insert so an item never has more than one.

mod migrations;

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};
use clipping_shared::{
    ClippingError, CollectionRun, ContentResult, ItemId, MatchDetail, NewsItem, RawItem, Result,
    ScoringResult, StoreStats, UNSCORED_LABEL,
};
use libsql::{Connection, Database, params};

/// Columns selected for every [`NewsItem`] read, in `row_to_news_item` order.
const NEWS_COLUMNS: &str = "id, titulo, link, resumo, fonte, data_coleta, data_publicacao, \
     content, title_extracted, word_count, extraction_success, favorita, created_at, updated_at";

/// Content shorter than this is treated as missing by the extraction query.
const MIN_CONTENT_CHARS: i64 = 100;

/// Items need more words than this to be scored.
const MIN_SCORING_WORDS: i64 = 50;

fn storage_err(e: impl std::fmt::Display) -> ClippingError {
    ClippingError::Storage(e.to_string())
}

/// Primary storage handle wrapping a libSQL database.
pub struct Store {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Store {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ClippingError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let store = Self {
            db,
            conn,
            readonly: false,
        };
        store.enable_foreign_keys().await?;
        store.run_migrations().await?;
        Ok(store)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ClippingError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    async fn enable_foreign_keys(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ClippingError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(ClippingError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // News items
    // -----------------------------------------------------------------------

    /// Insert a collected item keyed by its link.
    ///
    /// Returns `(id, true)` for a new row, or the id of the row already holding
    /// this link and `false`. Any other constraint failure is an error.
    pub async fn insert_item(&self, item: &RawItem) -> Result<(ItemId, bool)> {
        self.check_writable()?;
        let now = format_ts(&Utc::now());
        let changed = self
            .conn
            .execute(
                "INSERT INTO noticias (titulo, link, resumo, fonte, data_coleta, data_publicacao,
                                       created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(link) DO NOTHING",
                params![
                    item.title.as_str(),
                    item.link.as_str(),
                    item.summary.as_str(),
                    item.source.as_str(),
                    format_ts(&item.collected_at),
                    item.published_at.as_ref().map(format_ts),
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;

        if changed > 0 {
            return Ok((self.conn.last_insert_rowid(), true));
        }

        match self.item_id_by_link(&item.link).await? {
            Some(id) => Ok((id, false)),
            None => Err(ClippingError::Storage(format!(
                "insert of {} was ignored but no existing row was found",
                item.link
            ))),
        }
    }

    async fn item_id_by_link(&self, link: &str) -> Result<Option<ItemId>> {
        let mut rows = self
            .conn
            .query("SELECT id FROM noticias WHERE link = ?1", params![link])
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row.get::<i64>(0).map_err(storage_err)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Get an item by id.
    pub async fn get_item(&self, id: ItemId) -> Result<Option<NewsItem>> {
        let sql = format!("SELECT {NEWS_COLUMNS} FROM noticias WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id])
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_news_item(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Items whose extraction has not succeeded and whose content is missing
    /// or too short, most recently collected first.
    pub async fn items_needing_extraction(&self, limit: u32) -> Result<Vec<NewsItem>> {
        let sql = format!(
            "SELECT {NEWS_COLUMNS} FROM noticias
             WHERE COALESCE(extraction_success, 0) = 0
               AND (content IS NULL OR content = '' OR LENGTH(content) < ?1)
             ORDER BY data_coleta DESC, id DESC
             LIMIT ?2"
        );
        self.query_items(&sql, params![MIN_CONTENT_CHARS, i64::from(limit)])
            .await
    }

    /// Extracted items with enough words and no scoring result yet,
    /// most recently collected first.
    pub async fn items_needing_scoring(&self, limit: u32) -> Result<Vec<NewsItem>> {
        let sql = format!(
            "SELECT {NEWS_COLUMNS} FROM noticias n
             WHERE n.extraction_success = 1
               AND n.word_count > ?1
               AND NOT EXISTS (SELECT 1 FROM scoring s WHERE s.noticia_id = n.id)
             ORDER BY n.data_coleta DESC, n.id DESC
             LIMIT ?2"
        );
        self.query_items(&sql, params![MIN_SCORING_WORDS, i64::from(limit)])
            .await
    }

    async fn query_items(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<NewsItem>> {
        let mut rows = self.conn.query(sql, params).await.map_err(storage_err)?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            items.push(row_to_news_item(&row)?);
        }
        Ok(items)
    }

    /// Overwrite the extraction fields of an item. Last write wins.
    pub async fn update_content(&self, id: ItemId, result: &ContentResult) -> Result<()> {
        self.check_writable()?;
        let now = format_ts(&Utc::now());
        let changed = self
            .conn
            .execute(
                "UPDATE noticias
                 SET content = ?1, title_extracted = ?2, word_count = ?3,
                     extraction_success = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![
                    result.content.as_str(),
                    result.extracted_title.as_str(),
                    i64::from(result.word_count),
                    i64::from(result.success),
                    now.as_str(),
                    id,
                ],
            )
            .await
            .map_err(storage_err)?;

        if changed == 0 {
            return Err(ClippingError::Storage(format!("news item {id} not found")));
        }
        Ok(())
    }

    /// Mark or unmark an item as favorite. Favorites survive pruning.
    pub async fn set_favorite(&self, id: ItemId, favorite: bool) -> Result<()> {
        self.check_writable()?;
        let now = format_ts(&Utc::now());
        let changed = self
            .conn
            .execute(
                "UPDATE noticias SET favorita = ?1, updated_at = ?2 WHERE id = ?3",
                params![i64::from(favorite), now.as_str(), id],
            )
            .await
            .map_err(storage_err)?;

        if changed == 0 {
            return Err(ClippingError::Storage(format!("news item {id} not found")));
        }
        Ok(())
    }

    /// Delete non-favorite items collected more than `days` ago.
    /// Their scoring rows go with them. Returns the number of deleted items.
    pub async fn prune_older_than(&self, days: u32) -> Result<u64> {
        self.check_writable()?;
        let cutoff = format_ts(&(Utc::now() - Duration::days(i64::from(days))));
        let deleted = self
            .conn
            .execute(
                "DELETE FROM noticias WHERE data_coleta < ?1 AND COALESCE(favorita, 0) = 0",
                params![cutoff.as_str()],
            )
            .await
            .map_err(storage_err)?;

        tracing::info!(days, deleted, "pruned old items");
        Ok(deleted)
    }

    // -----------------------------------------------------------------------
    // Scoring
    // -----------------------------------------------------------------------

    /// Replace the scoring result of an item: any prior row is deleted and the
    /// new one inserted inside a single transaction.
    pub async fn upsert_scoring(&self, id: ItemId, result: &ScoringResult) -> Result<()> {
        self.check_writable()?;
        let details = serde_json::to_string(&result.details).map_err(storage_err)?;
        let now = format_ts(&Utc::now());

        let tx = self.conn.transaction().await.map_err(storage_err)?;

        let outcome = async {
            tx.execute("DELETE FROM scoring WHERE noticia_id = ?1", params![id])
                .await?;
            tx.execute(
                "INSERT INTO scoring (noticia_id, score_interesse, score_risco, relevancia,
                                      eixo_principal, termos_encontrados, termos_detalhes,
                                      scoring_version, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id,
                    result.interest_score,
                    result.risk_score,
                    result.relevance.as_str(),
                    result.primary_axis.as_str(),
                    i64::from(result.matched_terms),
                    details.as_str(),
                    result.version.as_str(),
                    now.as_str(),
                ],
            )
            .await?;
            Ok::<(), libsql::Error>(())
        }
        .await;

        match outcome {
            Ok(()) => tx.commit().await.map_err(storage_err),
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(storage_err(e))
            }
        }
    }

    /// Get the scoring result of an item, if any.
    pub async fn get_scoring(&self, id: ItemId) -> Result<Option<ScoringResult>> {
        let mut rows = self
            .conn
            .query(
                "SELECT score_interesse, score_risco, relevancia, eixo_principal,
                        termos_encontrados, termos_detalhes, scoring_version
                 FROM scoring WHERE noticia_id = ?1
                 ORDER BY id DESC LIMIT 1",
                params![id],
            )
            .await
            .map_err(storage_err)?;

        let row = match rows.next().await.map_err(storage_err)? {
            Some(row) => row,
            None => return Ok(None),
        };

        let relevance: String = row.get(2).map_err(storage_err)?;
        let details: Vec<MatchDetail> = match row.get::<String>(5).ok() {
            Some(json) if !json.is_empty() => serde_json::from_str(&json)
                .map_err(|e| ClippingError::Storage(format!("invalid match details: {e}")))?,
            _ => Vec::new(),
        };

        Ok(Some(ScoringResult {
            interest_score: row.get::<f64>(0).unwrap_or(0.0),
            risk_score: row.get::<f64>(1).unwrap_or(0.0),
            relevance: relevance.parse()?,
            primary_axis: row.get::<String>(3).unwrap_or_default(),
            matched_terms: row.get::<u32>(4).unwrap_or(0),
            details,
            version: row.get::<String>(6).map_err(storage_err)?,
        }))
    }

    /// Number of scoring rows stored for an item.
    pub async fn scoring_rows(&self, id: ItemId) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM scoring WHERE noticia_id = ?1", params![id])
            .await
    }

    // -----------------------------------------------------------------------
    // Collection log
    // -----------------------------------------------------------------------

    /// Append a collection run. Failures are logged and never returned.
    pub async fn record_run(&self, run: &CollectionRun) {
        if let Err(e) = self.try_record_run(run).await {
            tracing::warn!(source = %run.source, error = %e, "failed to record collection run");
        }
    }

    async fn try_record_run(&self, run: &CollectionRun) -> Result<()> {
        self.check_writable()?;
        let now = format_ts(&Utc::now());
        self.conn
            .execute(
                "INSERT INTO coletas (data_execucao, fonte, noticias_coletadas, noticias_novas,
                                      noticias_duplicadas, tempo_execucao, status, observacoes,
                                      created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    format_ts(&run.executed_at),
                    run.source.as_str(),
                    i64::from(run.collected),
                    i64::from(run.new_items),
                    i64::from(run.duplicates),
                    run.elapsed_secs,
                    run.status.as_str(),
                    run.notes.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Most recent collection runs, newest first.
    pub async fn recent_runs(&self, limit: u32) -> Result<Vec<CollectionRun>> {
        let mut rows = self
            .conn
            .query(
                "SELECT fonte, data_execucao, noticias_coletadas, noticias_novas,
                        noticias_duplicadas, tempo_execucao, status, observacoes
                 FROM coletas ORDER BY data_execucao DESC, id DESC LIMIT ?1",
                params![i64::from(limit)],
            )
            .await
            .map_err(storage_err)?;

        let mut runs = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let executed_at: String = row.get(1).map_err(storage_err)?;
            let status: String = row.get(6).map_err(storage_err)?;
            runs.push(CollectionRun {
                source: row.get::<String>(0).map_err(storage_err)?,
                executed_at: parse_ts(&executed_at)?,
                collected: row.get::<u32>(2).unwrap_or(0),
                new_items: row.get::<u32>(3).unwrap_or(0),
                duplicates: row.get::<u32>(4).unwrap_or(0),
                elapsed_secs: row.get::<f64>(5).unwrap_or(0.0),
                status: status.parse()?,
                notes: row.get::<String>(7).unwrap_or_default(),
            });
        }
        Ok(runs)
    }

    // -----------------------------------------------------------------------
    // Statistics
    // -----------------------------------------------------------------------

    /// Aggregate counts for run reporting.
    pub async fn stats(&self) -> Result<StoreStats> {
        let total_items = self.count("SELECT COUNT(*) FROM noticias", params![]).await?;
        let with_content = self
            .count(
                "SELECT COUNT(*) FROM noticias WHERE extraction_success = 1",
                params![],
            )
            .await?;

        let by_source = self
            .grouped_counts("SELECT fonte, COUNT(*) FROM noticias GROUP BY fonte", params![])
            .await?;
        let by_relevance = self
            .grouped_counts(
                "SELECT COALESCE(s.relevancia, ?1), COUNT(*)
                 FROM noticias n LEFT JOIN scoring s ON s.noticia_id = n.id
                 GROUP BY 1",
                params![UNSCORED_LABEL],
            )
            .await?;

        let mut rows = self
            .conn
            .query(
                "SELECT MIN(data_coleta), MAX(data_coleta) FROM noticias",
                params![],
            )
            .await
            .map_err(storage_err)?;
        let (first_collected, last_collected) = match rows.next().await.map_err(storage_err)? {
            Some(row) => (
                row.get::<String>(0).ok().map(|s| parse_ts(&s)).transpose()?,
                row.get::<String>(1).ok().map(|s| parse_ts(&s)).transpose()?,
            ),
            None => (None, None),
        };

        Ok(StoreStats {
            total_items,
            by_source,
            by_relevance,
            with_content,
            first_collected,
            last_collected,
        })
    }

    async fn count(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<u64> {
        let mut rows = self.conn.query(sql, params).await.map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)?.max(0) as u64),
            None => Ok(0),
        }
    }

    async fn grouped_counts(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<BTreeMap<String, u64>> {
        let mut rows = self.conn.query(sql, params).await.map_err(storage_err)?;
        let mut counts = BTreeMap::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let key: String = row.get(0).map_err(storage_err)?;
            let n: i64 = row.get(1).map_err(storage_err)?;
            counts.insert(key, n.max(0) as u64);
        }
        Ok(counts)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Timestamps are stored as fixed-width RFC 3339 UTC so text order is time order.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp. Naive `YYYY-MM-DD HH:MM:SS` values are read as UTC.
fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ClippingError::Storage(format!("invalid date: {s}")))
}

/// Convert a row selected with [`NEWS_COLUMNS`] to a [`NewsItem`].
fn row_to_news_item(row: &libsql::Row) -> Result<NewsItem> {
    let collected_at: String = row.get(5).map_err(storage_err)?;
    let created_at: String = row.get(12).map_err(storage_err)?;
    let updated_at: String = row.get(13).map_err(storage_err)?;

    Ok(NewsItem {
        id: row.get::<i64>(0).map_err(storage_err)?,
        title: row.get::<String>(1).map_err(storage_err)?,
        link: row.get::<String>(2).map_err(storage_err)?,
        summary: row.get::<String>(3).unwrap_or_default(),
        source: row.get::<String>(4).map_err(storage_err)?,
        collected_at: parse_ts(&collected_at)?,
        published_at: row.get::<String>(6).ok().and_then(|s| parse_ts(&s).ok()),
        content: row.get::<String>(7).ok(),
        extracted_title: row.get::<String>(8).ok(),
        word_count: row.get::<u32>(9).unwrap_or(0),
        extraction_success: row.get::<i64>(10).unwrap_or(0) != 0,
        favorite: row.get::<i64>(11).unwrap_or(0) != 0,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipping_shared::{MatchDetail, Relevance, RunStatus, SCORING_VERSION};
    use uuid::Uuid;

    /// Create a temp file store for testing.
    async fn test_store() -> Store {
        let tmp = std::env::temp_dir().join(format!("clipping_test_{}.db", Uuid::now_v7()));
        Store::open(&tmp).await.expect("open test db")
    }

    fn raw(link: &str, collected_at: DateTime<Utc>) -> RawItem {
        RawItem {
            title: format!("Notícia {link}"),
            link: link.to_string(),
            summary: String::new(),
            source: "camara_dos_deputados".into(),
            collected_at,
            published_at: None,
        }
    }

    fn extracted(words: u32) -> ContentResult {
        let content = vec!["palavra"; words as usize].join(" ");
        ContentResult {
            content,
            extracted_title: "Título extraído".into(),
            word_count: words,
            success: true,
        }
    }

    fn scoring(interest: f64, relevance: Relevance) -> ScoringResult {
        ScoringResult {
            interest_score: interest,
            risk_score: 1.0,
            relevance,
            primary_axis: "Economia".into(),
            matched_terms: 1,
            details: vec![MatchDetail {
                term: "tributo".into(),
                axis: "Economia".into(),
                count: 1,
                interest_weight: interest,
                risk_weight: 1.0,
                contribution: interest,
            }],
            version: SCORING_VERSION.into(),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let store = test_store().await;
        assert_eq!(store.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("clipping_test_{}.db", Uuid::now_v7()));
        let s1 = Store::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Store::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn insert_is_idempotent_by_link() {
        let store = test_store().await;
        let item = raw("https://www.camara.leg.br/noticias/1000001-x", Utc::now());

        let (id1, new1) = store.insert_item(&item).await.expect("first insert");
        let (id2, new2) = store.insert_item(&item).await.expect("second insert");

        assert!(new1);
        assert!(!new2);
        assert_eq!(id1, id2);
        assert_eq!(store.stats().await.unwrap().total_items, 1);
    }

    #[tokio::test]
    async fn get_item_round_trips_fields() {
        let store = test_store().await;
        let mut item = raw("https://example.org/a", Utc::now());
        item.summary = "Resumo".into();
        item.published_at = Some(Utc::now() - Duration::hours(2));
        let (id, _) = store.insert_item(&item).await.unwrap();

        let stored = store.get_item(id).await.unwrap().expect("item exists");
        assert_eq!(stored.link, item.link);
        assert_eq!(stored.summary, "Resumo");
        assert!(stored.published_at.is_some());
        assert!(stored.content.is_none());
        assert!(!stored.extraction_success);
        assert!(store.get_item(id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn extraction_queue_is_newest_first_and_bounded() {
        let store = test_store().await;
        let now = Utc::now();
        let (old, _) = store
            .insert_item(&raw("https://example.org/old", now - Duration::hours(3)))
            .await
            .unwrap();
        let (mid, _) = store
            .insert_item(&raw("https://example.org/mid", now - Duration::hours(2)))
            .await
            .unwrap();
        let (new, _) = store
            .insert_item(&raw("https://example.org/new", now - Duration::hours(1)))
            .await
            .unwrap();

        let batch = store.items_needing_extraction(2).await.unwrap();
        let ids: Vec<_> = batch.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![new, mid]);

        store.update_content(new, &extracted(80)).await.unwrap();
        // Failed extraction with short content stays eligible.
        store
            .update_content(
                mid,
                &ContentResult {
                    content: "curto".into(),
                    success: false,
                    ..ContentResult::default()
                },
            )
            .await
            .unwrap();

        let ids: Vec<_> = store
            .items_needing_extraction(10)
            .await
            .unwrap()
            .iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![mid, old]);
    }

    #[tokio::test]
    async fn scoring_queue_requires_words_and_no_result() {
        let store = test_store().await;
        let now = Utc::now();
        let (short, _) = store
            .insert_item(&raw("https://example.org/short", now))
            .await
            .unwrap();
        let (long, _) = store
            .insert_item(&raw("https://example.org/long", now))
            .await
            .unwrap();
        let (unextracted, _) = store
            .insert_item(&raw("https://example.org/none", now))
            .await
            .unwrap();

        store.update_content(short, &extracted(50)).await.unwrap();
        store.update_content(long, &extracted(51)).await.unwrap();

        let ids: Vec<_> = store
            .items_needing_scoring(10)
            .await
            .unwrap()
            .iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![long]);
        assert!(!ids.contains(&unextracted));

        store
            .upsert_scoring(long, &scoring(4.0, Relevance::LowMedium))
            .await
            .unwrap();
        assert!(store.items_needing_scoring(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_scoring_keeps_one_row_with_latest_values() {
        let store = test_store().await;
        let (id, _) = store
            .insert_item(&raw("https://example.org/scored", Utc::now()))
            .await
            .unwrap();

        store
            .upsert_scoring(id, &scoring(4.0, Relevance::LowMedium))
            .await
            .unwrap();
        store
            .upsert_scoring(id, &scoring(16.0, Relevance::High))
            .await
            .unwrap();

        assert_eq!(store.scoring_rows(id).await.unwrap(), 1);
        let stored = store.get_scoring(id).await.unwrap().expect("scored");
        assert_eq!(stored.interest_score, 16.0);
        assert_eq!(stored.relevance, Relevance::High);
        assert_eq!(stored.details.len(), 1);
        assert_eq!(stored.details[0].term, "tributo");
    }

    #[tokio::test]
    async fn upsert_scoring_for_missing_item_fails() {
        let store = test_store().await;
        let err = store
            .upsert_scoring(4242, &scoring(1.0, Relevance::Low))
            .await
            .unwrap_err();
        assert!(matches!(err, ClippingError::Storage(_)));
    }

    #[tokio::test]
    async fn update_content_for_missing_item_fails() {
        let store = test_store().await;
        assert!(store.update_content(99, &extracted(60)).await.is_err());
    }

    #[tokio::test]
    async fn record_run_and_list() {
        let store = test_store().await;
        store
            .record_run(&CollectionRun::success("senado_federal", 10, 4, 2.5))
            .await;
        store
            .record_run(&CollectionRun::failure("agencia_gov", 0.3, "HTTP 503"))
            .await;

        let runs = store.recent_runs(10).await.unwrap();
        assert_eq!(runs.len(), 2);
        let failed = runs.iter().find(|r| r.source == "agencia_gov").unwrap();
        assert_eq!(failed.status, RunStatus::Error);
        assert_eq!(failed.notes, "HTTP 503");
        let ok = runs.iter().find(|r| r.source == "senado_federal").unwrap();
        assert_eq!(ok.duplicates, 6);
    }

    #[tokio::test]
    async fn stats_groups_sources_and_relevance() {
        let store = test_store().await;
        let now = Utc::now();
        let (a, _) = store.insert_item(&raw("https://example.org/1", now)).await.unwrap();
        let mut other = raw("https://example.org/2", now - Duration::days(1));
        other.source = "senado_federal".into();
        store.insert_item(&other).await.unwrap();

        store.update_content(a, &extracted(60)).await.unwrap();
        store
            .upsert_scoring(a, &scoring(9.0, Relevance::Medium))
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_items, 2);
        assert_eq!(stats.with_content, 1);
        assert_eq!(stats.by_source.get("senado_federal"), Some(&1));
        assert_eq!(stats.by_relevance.get("Média"), Some(&1));
        assert_eq!(stats.by_relevance.get(UNSCORED_LABEL), Some(&1));
        assert!(stats.first_collected < stats.last_collected);
    }

    #[tokio::test]
    async fn prune_keeps_favorites_and_cascades_scoring() {
        let store = test_store().await;
        let old = Utc::now() - Duration::days(90);
        let (stale, _) = store.insert_item(&raw("https://example.org/stale", old)).await.unwrap();
        let (kept, _) = store.insert_item(&raw("https://example.org/fav", old)).await.unwrap();
        let (fresh, _) = store
            .insert_item(&raw("https://example.org/fresh", Utc::now()))
            .await
            .unwrap();

        store.update_content(stale, &extracted(60)).await.unwrap();
        store
            .upsert_scoring(stale, &scoring(3.0, Relevance::LowMedium))
            .await
            .unwrap();
        store.set_favorite(kept, true).await.unwrap();

        let deleted = store.prune_older_than(60).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_item(stale).await.unwrap().is_none());
        assert_eq!(store.scoring_rows(stale).await.unwrap(), 0);
        assert!(store.get_item(kept).await.unwrap().unwrap().favorite);
        assert!(store.get_item(fresh).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("clipping_test_{}.db", Uuid::now_v7()));
        drop(Store::open(&tmp).await.expect("create"));

        let ro = Store::open_readonly(&tmp).await.expect("open readonly");
        let err = ro
            .insert_item(&raw("https://example.org/ro", Utc::now()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("read-only"));
        assert_eq!(ro.stats().await.unwrap().total_items, 0);
    }

    #[tokio::test]
    async fn readonly_requires_existing_file() {
        let tmp = std::env::temp_dir().join(format!("clipping_missing_{}.db", Uuid::now_v7()));
        assert!(Store::open_readonly(&tmp).await.is_err());
    }

    #[test]
    fn parses_legacy_timestamps() {
        let ts = parse_ts("2025-03-04 10:20:30").expect("naive timestamp");
        assert_eq!(format_ts(&ts), "2025-03-04T10:20:30.000000Z");
        assert!(parse_ts("ontem").is_err());
    }
}
