//! Core domain types for the clipping pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ClippingError;

/// Version tag stamped on every persisted scoring result.
pub const SCORING_VERSION: &str = "v1";

/// Row identifier of a stored news item.
pub type ItemId = i64;

// ---------------------------------------------------------------------------
// News items
// ---------------------------------------------------------------------------

/// An item as returned by a source collector, before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub title: String,
    /// Canonical URL; the natural key for deduplication.
    pub link: String,
    pub summary: String,
    /// Source code, e.g. `camara_dos_deputados`.
    pub source: String,
    pub collected_at: DateTime<Utc>,
    /// Many listings do not carry a publication date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

/// A stored news item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: ItemId,
    pub title: String,
    pub link: String,
    pub summary: String,
    pub source: String,
    pub collected_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    /// Extracted body text, absent until extraction runs.
    pub content: Option<String>,
    pub extracted_title: Option<String>,
    pub word_count: u32,
    pub extraction_success: bool,
    pub favorite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Output of the content extractor for one URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentResult {
    pub content: String,
    pub extracted_title: String,
    pub word_count: u32,
    pub success: bool,
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Discrete relevance class derived from the interest score.
///
/// Persisted with the Portuguese labels used by existing databases
/// (`Alta`, `Média`, `Baixa-Média`, `Baixa`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Relevance {
    #[serde(rename = "Baixa")]
    Low,
    #[serde(rename = "Baixa-Média")]
    LowMedium,
    #[serde(rename = "Média")]
    Medium,
    #[serde(rename = "Alta")]
    High,
}

impl Relevance {
    /// Label stored in the `relevancia` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "Alta",
            Self::Medium => "Média",
            Self::LowMedium => "Baixa-Média",
            Self::Low => "Baixa",
        }
    }
}

impl std::fmt::Display for Relevance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Relevance {
    type Err = ClippingError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "alta" | "high" => Ok(Self::High),
            "média" | "media" | "medium" => Ok(Self::Medium),
            "baixa-média" | "baixa-media" | "low-medium" | "low_medium" => Ok(Self::LowMedium),
            "baixa" | "low" => Ok(Self::Low),
            other => Err(ClippingError::validation(format!(
                "unknown relevance label '{other}'"
            ))),
        }
    }
}

/// One matched dictionary term inside a scoring result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDetail {
    #[serde(rename = "termo")]
    pub term: String,
    #[serde(rename = "eixo")]
    pub axis: String,
    pub count: u32,
    #[serde(rename = "peso_interesse")]
    pub interest_weight: f64,
    #[serde(rename = "peso_risco")]
    pub risk_weight: f64,
    /// `count × interest_weight`.
    #[serde(rename = "score_contribuicao")]
    pub contribution: f64,
}

/// Result of scoring one item against the term dictionary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringResult {
    pub interest_score: f64,
    pub risk_score: f64,
    pub relevance: Relevance,
    /// Empty when nothing matched.
    pub primary_axis: String,
    /// Distinct dictionary terms with at least one occurrence.
    pub matched_terms: u32,
    /// First matches in dictionary order, bounded.
    pub details: Vec<MatchDetail>,
    pub version: String,
}

impl ScoringResult {
    /// The all-zero result used when no dictionary is available.
    pub fn empty() -> Self {
        Self {
            interest_score: 0.0,
            risk_score: 0.0,
            relevance: Relevance::Low,
            primary_axis: String::new(),
            matched_terms: 0,
            details: Vec::new(),
            version: SCORING_VERSION.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Collection runs
// ---------------------------------------------------------------------------

/// Outcome of collecting one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = ClippingError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            other => Err(ClippingError::validation(format!(
                "unknown run status '{other}'"
            ))),
        }
    }
}

/// Append-only log entry for one (source, execution) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRun {
    pub source: String,
    pub executed_at: DateTime<Utc>,
    pub collected: u32,
    pub new_items: u32,
    pub duplicates: u32,
    pub elapsed_secs: f64,
    pub status: RunStatus,
    pub notes: String,
}

impl CollectionRun {
    /// A successful run; duplicates are derived from the two counts.
    pub fn success(source: &str, collected: u32, new_items: u32, elapsed_secs: f64) -> Self {
        Self {
            source: source.to_string(),
            executed_at: Utc::now(),
            collected,
            new_items,
            duplicates: collected.saturating_sub(new_items),
            elapsed_secs,
            status: RunStatus::Success,
            notes: String::new(),
        }
    }

    /// A failed run carrying the error text.
    pub fn failure(source: &str, elapsed_secs: f64, notes: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            executed_at: Utc::now(),
            collected: 0,
            new_items: 0,
            duplicates: 0,
            elapsed_secs,
            status: RunStatus::Error,
            notes: notes.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Store statistics
// ---------------------------------------------------------------------------

/// Label under which items without a scoring result are counted.
pub const UNSCORED_LABEL: &str = "unscored";

/// Aggregate counts used for run reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_items: u64,
    pub by_source: BTreeMap<String, u64>,
    pub by_relevance: BTreeMap<String, u64>,
    /// Items whose extraction succeeded.
    pub with_content: u64,
    pub first_collected: Option<DateTime<Utc>>,
    pub last_collected: Option<DateTime<Utc>>,
}
