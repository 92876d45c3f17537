//! Run configuration.
//!
//! One immutable [`AnalyticsConfig`] value is handed to every component; no
//! component reads global state. Configuration is stored in TOML. Every
//! section is optional and falls back to its defaults; `today` may come from
//! the file or from the caller.
//!
//! # Example Configuration
//!
//! ```toml
//! today = "2025-06-30"
//! range_start = "2025-06-01"
//! trend_group_by = "week"
//!
//! [lag]
//! lookback_days = 60
//! stable_offset_days = 30
//!
//! [forecast]
//! window_days = 7
//! max_uplift = 5.0
//!
//! [pacing]
//! low_threshold = 0.9
//! high_threshold = 1.1
//!
//! [recommend]
//! target_roas = 4.0
//! ```

use chrono::NaiveDate;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::analytics::forecast::ForecastConfig;
use crate::analytics::lag::LagConfig;
use crate::analytics::pacing::PacingConfig;
use crate::analytics::recommend::RecommendationConfig;
use crate::analytics::types::GroupBy;

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("No reference date: set `today` in the config or pass one explicitly")]
    MissingToday,

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Configuration for one analytics run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Reference date for every window.
    pub today: NaiveDate,

    /// Inclusive lower bound for the performance tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_start: Option<NaiveDate>,

    /// Inclusive upper bound for the performance tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_end: Option<NaiveDate>,

    /// Granularity of the trend table.
    #[serde(default)]
    pub trend_group_by: GroupBy,

    #[serde(default)]
    pub lag: LagConfig,

    #[serde(default)]
    pub forecast: ForecastConfig,

    #[serde(default)]
    pub pacing: PacingConfig,

    #[serde(default)]
    pub recommend: RecommendationConfig,
}

impl AnalyticsConfig {
    /// Defaults for every section, anchored at `today`.
    pub fn for_today(today: NaiveDate) -> Self {
        Self {
            today,
            range_start: None,
            range_end: None,
            trend_group_by: GroupBy::default(),
            lag: LagConfig::default(),
            forecast: ForecastConfig::default(),
            pacing: PacingConfig::default(),
            recommend: RecommendationConfig::default(),
        }
    }

    /// True when a record dated `date` belongs to the configured range.
    /// Undated records always do.
    pub fn in_range(&self, date: Option<NaiveDate>) -> bool {
        let Some(date) = date else {
            return true;
        };
        self.range_start.is_none_or(|start| date >= start)
            && self.range_end.is_none_or(|end| date <= end)
    }

    /// Validate thresholds, windows and bucket definitions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let (Some(start), Some(end)) = (self.range_start, self.range_end)
            && start > end
        {
            return Err(ConfigError::Validation(format!(
                "range_start {start} is after range_end {end}"
            )));
        }

        let p = &self.pacing;
        if p.low_threshold < 0.0 || p.high_threshold < 0.0 {
            return Err(ConfigError::Validation(
                "Pacing thresholds cannot be negative".into(),
            ));
        }
        if p.low_threshold > p.high_threshold {
            return Err(ConfigError::Validation(format!(
                "pacing.low_threshold {} exceeds pacing.high_threshold {}",
                p.low_threshold, p.high_threshold
            )));
        }

        if self.forecast.max_uplift.is_nan() || self.forecast.max_uplift < 1.0 {
            return Err(ConfigError::Validation(
                "forecast.max_uplift must be at least 1.0".into(),
            ));
        }
        if self.forecast.window_days == 0 {
            return Err(ConfigError::Validation(
                "forecast.window_days must be positive".into(),
            ));
        }
        if self.lag.lookback_days == 0 {
            return Err(ConfigError::Validation(
                "lag.lookback_days must be positive".into(),
            ));
        }

        let buckets = &self.lag.buckets;
        if buckets.is_empty() {
            return Err(ConfigError::Validation(
                "lag.buckets cannot be empty".into(),
            ));
        }
        for (i, bucket) in buckets.iter().enumerate() {
            if bucket.name.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "Lag bucket name cannot be empty".into(),
                ));
            }
            if bucket.last_day.is_none() && i + 1 != buckets.len() {
                return Err(ConfigError::Validation(format!(
                    "Unbounded lag bucket '{}' must be the last bucket",
                    bucket.name
                )));
            }
        }
        // A raw bucket label must resolve to exactly one definition.
        let mut labels = FxHashSet::default();
        for bucket in buckets {
            let own: FxHashSet<String> = std::iter::once(&bucket.name)
                .chain(&bucket.aliases)
                .map(|label| label.trim().to_ascii_lowercase())
                .collect();
            for label in own {
                if !labels.insert(label.clone()) {
                    return Err(ConfigError::Validation(format!(
                        "Lag bucket label '{label}' is used by more than one bucket"
                    )));
                }
            }
        }
        for pair in buckets.windows(2) {
            if let (Some(a), Some(b)) = (pair[0].last_day, pair[1].last_day)
                && b <= a
            {
                return Err(ConfigError::Validation(format!(
                    "Lag buckets must be strictly ascending: '{}' ({a}) then '{}' ({b})",
                    pair[0].name, pair[1].name
                )));
            }
        }

        let r = &self.recommend;
        if r.target_roas < 0.0 || r.cpa_factor < 0.0 || r.ctr_floor < 0.0 {
            return Err(ConfigError::Validation(
                "Recommendation thresholds cannot be negative".into(),
            ));
        }

        Ok(())
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Parse configuration from TOML text. `today_override` wins over the file.
pub fn parse_config(
    content: &str,
    today_override: Option<NaiveDate>,
) -> Result<AnalyticsConfig, ConfigError> {
    let mut table: toml::Table = content.parse()?;
    if let Some(today) = today_override {
        table.insert(
            "today".into(),
            toml::Value::String(today.format("%Y-%m-%d").to_string()),
        );
    }
    if !table.contains_key("today") {
        return Err(ConfigError::MissingToday);
    }
    let config: AnalyticsConfig = toml::Value::Table(table).try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a specific path.
pub fn load_config(
    path: &Path,
    today_override: Option<NaiveDate>,
) -> Result<AnalyticsConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content, today_override)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
