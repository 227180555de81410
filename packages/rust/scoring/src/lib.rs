//! Weighted term scoring for news items.
//!
//! A [`Dictionary`] of thematic terms is loaded once from a `;`-delimited
//! file and compiled into a [`ScoringEngine`], which turns a title and body
//! into a [`ScoringResult`](clipping_shared::ScoringResult): interest and
//! risk scores, a relevance class, the primary thematic axis and the first
//! matched terms.

mod dictionary;
mod engine;

pub use dictionary::{DEFAULT_AXIS, Dictionary, DictionaryTerm, MatchType};
pub use engine::{
    HIGH_THRESHOLD, LOW_MEDIUM_THRESHOLD, MAX_DETAILS, MEDIUM_THRESHOLD, ScoringEngine, classify,
    normalize,
};
