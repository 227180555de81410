//! Application configuration for the clipping pipeline.
//!
//! User config lives at `~/.clipping/clipping.toml`.
//! Environment variables override config file values, which override defaults.
//! CLI flags override both for a single run.

use std::path::{Path, PathBuf};

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{ClippingError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "clipping.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".clipping";

// ---------------------------------------------------------------------------
// Config structs (matching clipping.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub collection: CollectionConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub retention: RetentionConfig,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data").join("clipping.db")
}

/// `[collection]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Listing pages fetched per source per run.
    #[serde(default = "default_max_pages")]
    pub max_pages_per_source: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Lower bound of the random delay between requests.
    #[serde(default = "default_min_delay")]
    pub min_delay_secs: f64,

    /// Upper bound of the random delay between requests.
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: f64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            max_pages_per_source: default_max_pages(),
            request_timeout_secs: default_request_timeout(),
            min_delay_secs: default_min_delay(),
            max_delay_secs: default_max_delay(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_max_pages() -> u32 {
    5
}
fn default_request_timeout() -> u64 {
    10
}
fn default_min_delay() -> f64 {
    1.0
}
fn default_max_delay() -> f64 {
    3.0
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".into()
}

/// `[extraction]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Items extracted per run.
    #[serde(default = "default_max_extraction")]
    pub max_per_run: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_per_run: default_max_extraction(),
        }
    }
}

fn default_max_extraction() -> u32 {
    50
}

/// `[scoring]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// `;`-delimited term dictionary.
    #[serde(default = "default_dictionary_file")]
    pub dictionary_file: PathBuf,

    /// Items scored per run.
    #[serde(default = "default_max_scoring")]
    pub max_per_run: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            dictionary_file: default_dictionary_file(),
            max_per_run: default_max_scoring(),
        }
    }
}

fn default_dictionary_file() -> PathBuf {
    PathBuf::from("data").join("dicionario.csv")
}
fn default_max_scoring() -> u32 {
    100
}

/// `[schedule]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Trigger times as `HH:MM`, local to `utc_offset_hours`.
    #[serde(default = "default_times")]
    pub times: Vec<String>,

    /// Allowed weekdays (`mon`, `tue`, ...).
    #[serde(default = "default_weekdays")]
    pub weekdays: Vec<String>,

    /// Offset of the schedule's local time from UTC.
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,

    /// Half-width of the window around each trigger in which a manual
    /// `run` is accepted without `--force`.
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            times: default_times(),
            weekdays: default_weekdays(),
            utc_offset_hours: default_utc_offset(),
            window_minutes: default_window_minutes(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_times() -> Vec<String> {
    vec!["12:00".into(), "20:00".into()]
}
fn default_weekdays() -> Vec<String> {
    ["mon", "tue", "wed", "thu", "fri"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_utc_offset() -> i32 {
    -3
}
fn default_window_minutes() -> u32 {
    60
}

impl ScheduleConfig {
    /// Parse `times` into clock times.
    pub fn parsed_times(&self) -> Result<Vec<NaiveTime>> {
        self.times
            .iter()
            .map(|t| {
                NaiveTime::parse_from_str(t.trim(), "%H:%M").map_err(|_| {
                    ClippingError::config(format!("invalid schedule time '{t}', expected HH:MM"))
                })
            })
            .collect()
    }

    /// Parse `weekdays` into chrono weekdays.
    pub fn parsed_weekdays(&self) -> Result<Vec<Weekday>> {
        self.weekdays
            .iter()
            .map(|d| {
                d.trim()
                    .parse::<Weekday>()
                    .map_err(|_| ClippingError::config(format!("invalid weekday '{d}'")))
            })
            .collect()
    }
}

/// `[retention]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Non-favorite items older than this are pruned.
    #[serde(default = "default_retention_days")]
    pub days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: default_retention_days(),
        }
    }
}

fn default_retention_days() -> u32 {
    60
}

// ---------------------------------------------------------------------------
// Environment overrides
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Apply environment overrides using the given variable lookup.
    ///
    /// Takes the lookup as a function so callers can pass `std::env::var`
    /// in production and a map in tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DATABASE_PATH") {
            self.storage.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("MAX_PAGES_PER_SOURCE") {
            self.collection.max_pages_per_source = parse_env("MAX_PAGES_PER_SOURCE", &v)?;
        }
        if let Some(v) = lookup("REQUEST_TIMEOUT") {
            self.collection.request_timeout_secs = parse_env("REQUEST_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("MIN_DELAY") {
            self.collection.min_delay_secs = parse_env("MIN_DELAY", &v)?;
        }
        if let Some(v) = lookup("MAX_DELAY") {
            self.collection.max_delay_secs = parse_env("MAX_DELAY", &v)?;
        }
        if let Some(v) = lookup("USER_AGENT") {
            self.collection.user_agent = v;
        }
        if let Some(v) = lookup("MAX_EXTRACTION_PER_RUN") {
            self.extraction.max_per_run = parse_env("MAX_EXTRACTION_PER_RUN", &v)?;
        }
        if let Some(v) = lookup("DICTIONARY_FILE") {
            self.scoring.dictionary_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("MAX_SCORING_PER_RUN") {
            self.scoring.max_per_run = parse_env("MAX_SCORING_PER_RUN", &v)?;
        }
        if let Some(v) = lookup("SCHEDULE_ENABLED") {
            self.schedule.enabled = match v.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(ClippingError::config(format!(
                        "SCHEDULE_ENABLED must be true or false, got '{v}'"
                    )));
                }
            };
        }
        if let Some(v) = lookup("SCHEDULE_TIMES") {
            self.schedule.times = v
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        if let Some(v) = lookup("RETENTION_DAYS") {
            self.retention.days = parse_env("RETENTION_DAYS", &v)?;
        }
        Ok(())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        let c = &self.collection;
        if c.min_delay_secs < 0.0 || c.min_delay_secs > c.max_delay_secs {
            return Err(ClippingError::config(format!(
                "delay bounds must satisfy 0 <= min <= max (got {}..{})",
                c.min_delay_secs, c.max_delay_secs
            )));
        }
        if c.request_timeout_secs == 0 {
            return Err(ClippingError::config("request timeout must be positive"));
        }
        self.schedule.parsed_times()?;
        self.schedule.parsed_weekdays()?;
        if !(-12..=14).contains(&self.schedule.utc_offset_hours) {
            return Err(ClippingError::config(format!(
                "utc_offset_hours {} out of range",
                self.schedule.utc_offset_hours
            )));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ClippingError::config(format!("{name} has an invalid value '{value}'")))
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.clipping/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ClippingError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.clipping/clipping.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ClippingError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ClippingError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Resolve the effective config: file (explicit path or default location),
/// then process environment, then validation.
pub fn resolve_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let mut config = match explicit {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    config.apply_env_overrides(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ClippingError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ClippingError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ClippingError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
