//! Shared types, error model, and configuration for the clipping pipeline.
//!
//! This crate is the foundation depended on by all other clipping crates.
//! It provides:
//! - [`ClippingError`] is the unified error type
//! - Domain types ([`RawItem`], [`NewsItem`], [`ScoringResult`], [`CollectionRun`])
//! - Configuration ([`AppConfig`], config loading and environment overrides)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CollectionConfig, ExtractionConfig, RetentionConfig, ScheduleConfig,
    ScoringConfig, StorageConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, resolve_config,
};
pub use error::{ClippingError, Result};
pub use types::{
    CollectionRun, ContentResult, ItemId, MatchDetail, NewsItem, RawItem, Relevance, RunStatus,
    SCORING_VERSION, ScoringResult, StoreStats, UNSCORED_LABEL,
};
