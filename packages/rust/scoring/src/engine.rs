//! Scoring engine: term matching, accumulation and classification.

use std::path::Path;

use regex::Regex;
use tracing::{info, warn};

use clipping_shared::{
    ClippingError, MatchDetail, Relevance, Result, SCORING_VERSION, ScoringResult,
};

use crate::dictionary::{Dictionary, DictionaryTerm, MatchType};

/// Interest score at or above which an item is [`Relevance::High`].
pub const HIGH_THRESHOLD: f64 = 15.0;
/// Interest score at or above which an item is [`Relevance::Medium`].
pub const MEDIUM_THRESHOLD: f64 = 8.0;
/// Interest score at or above which an item is [`Relevance::LowMedium`].
pub const LOW_MEDIUM_THRESHOLD: f64 = 3.0;

/// Number of match details kept per result.
pub const MAX_DETAILS: usize = 10;

/// Map an interest score onto the fixed relevance ladder.
pub fn classify(score: f64) -> Relevance {
    if score >= HIGH_THRESHOLD {
        Relevance::High
    } else if score >= MEDIUM_THRESHOLD {
        Relevance::Medium
    } else if score >= LOW_MEDIUM_THRESHOLD {
        Relevance::LowMedium
    } else {
        Relevance::Low
    }
}

/// Lower-case and strip Portuguese diacritics with a fixed table.
///
/// Applied to documents and to dictionary terms alike.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            'à' | 'á' | 'ã' | 'â' => 'a',
            'è' | 'é' | 'ê' => 'e',
            'ì' | 'í' | 'î' => 'i',
            'ò' | 'ó' | 'õ' | 'ô' => 'o',
            'ù' | 'ú' | 'û' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Compiled terms
// ---------------------------------------------------------------------------

enum Matcher {
    Substring(String),
    Word(Regex),
}

impl Matcher {
    fn count(&self, text: &str) -> u32 {
        let n = match self {
            Self::Substring(needle) => text.matches(needle.as_str()).count(),
            Self::Word(re) => re.find_iter(text).count(),
        };
        u32::try_from(n).unwrap_or(u32::MAX)
    }
}

struct CompiledTerm {
    term: DictionaryTerm,
    matcher: Matcher,
}

impl CompiledTerm {
    fn compile(term: DictionaryTerm) -> Result<Option<Self>> {
        let normalized = normalize(&term.term);
        if normalized.trim().is_empty() {
            return Ok(None);
        }

        let matcher = if term.match_type == MatchType::Phrase || normalized.contains(' ') {
            Matcher::Substring(normalized)
        } else {
            let pattern = format!(r"\b{}\b", regex::escape(&normalized));
            let re = Regex::new(&pattern).map_err(|e| {
                ClippingError::Dictionary(format!("cannot compile term '{}': {e}", term.term))
            })?;
            Matcher::Word(re)
        };

        Ok(Some(Self { term, matcher }))
    }
}

/// Per-axis accumulator, kept in first-match order.
struct AxisTotal<'a> {
    axis: &'a str,
    interest: f64,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Scores text against a compiled dictionary. Immutable after construction.
pub struct ScoringEngine {
    terms: Vec<CompiledTerm>,
}

impl ScoringEngine {
    /// Compile every term of `dictionary`.
    pub fn new(dictionary: Dictionary) -> Result<Self> {
        let mut terms = Vec::with_capacity(dictionary.len());
        for term in dictionary.terms().iter().cloned() {
            if let Some(compiled) = CompiledTerm::compile(term)? {
                terms.push(compiled);
            }
        }
        Ok(Self { terms })
    }

    /// An engine with no terms; [`is_available`](Self::is_available) is false.
    pub fn empty() -> Self {
        Self { terms: Vec::new() }
    }

    /// Load the dictionary at `path`, degrading to an empty engine when the
    /// file is missing or unreadable.
    pub fn from_path_or_empty(path: &Path) -> Self {
        if !path.exists() {
            warn!(path = %path.display(), "dictionary not found, scoring disabled");
            return Self::empty();
        }

        match Dictionary::load(path).and_then(Self::new) {
            Ok(engine) => {
                if engine.is_available() {
                    info!(
                        path = %path.display(),
                        terms = engine.term_count(),
                        "scoring engine ready"
                    );
                } else {
                    warn!(
                        path = %path.display(),
                        "dictionary has no usable terms, scoring disabled"
                    );
                }
                engine
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to load dictionary, scoring disabled"
                );
                Self::empty()
            }
        }
    }

    /// Whether any term is loaded.
    pub fn is_available(&self) -> bool {
        !self.terms.is_empty()
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Score a title and body.
    ///
    /// Terms are visited in dictionary order. The primary axis is the axis
    /// with the greatest interest total; on a tie the axis that matched first
    /// wins. Only the first [`MAX_DETAILS`] matches are reported, unsorted.
    pub fn score(&self, title: &str, body: &str) -> ScoringResult {
        if self.terms.is_empty() {
            return ScoringResult::empty();
        }

        let text = normalize(&format!("{title} {body}"));

        let mut interest_score = 0.0;
        let mut risk_score = 0.0;
        let mut matched_terms = 0u32;
        let mut details = Vec::new();
        let mut axes: Vec<AxisTotal<'_>> = Vec::new();

        for compiled in &self.terms {
            let count = compiled.matcher.count(&text);
            if count == 0 {
                continue;
            }

            let term = &compiled.term;
            let interest = f64::from(count) * term.interest_weight;
            let risk = f64::from(count) * term.risk_weight;

            interest_score += interest;
            risk_score += risk;
            matched_terms += 1;

            match axes.iter_mut().find(|a| a.axis == term.axis) {
                Some(total) => total.interest += interest,
                None => axes.push(AxisTotal {
                    axis: &term.axis,
                    interest,
                }),
            }

            if details.len() < MAX_DETAILS {
                details.push(MatchDetail {
                    term: term.term.clone(),
                    axis: term.axis.clone(),
                    count,
                    interest_weight: term.interest_weight,
                    risk_weight: term.risk_weight,
                    contribution: interest,
                });
            }
        }

        let mut primary: Option<&AxisTotal<'_>> = None;
        for total in &axes {
            if primary.is_none_or(|best| total.interest > best.interest) {
                primary = Some(total);
            }
        }

        ScoringResult {
            interest_score,
            risk_score,
            relevance: classify(interest_score),
            primary_axis: primary.map(|a| a.axis.to_string()).unwrap_or_default(),
            matched_terms,
            details,
            version: SCORING_VERSION.to_string(),
        }
    }
}
