//! Historical conversion-lag model.
//!
//! Conversions are reported late: a click today may convert (and be
//! attributed) days later. The lag-learning feed records, per day and lag
//! bucket, how many conversions eventually arrived at each lag. Summed over a
//! stable historical window this gives the share of conversions known after
//! `n` days, and `1 / cumulative_share` is the factor by which a recent day's
//! reported conversions under-state their final value.
//!
//! Buckets with no observed rows are skipped during the cumulative walk, not
//! zero-filled. A forecast for a lag that falls in a skipped bucket therefore
//! uses the next observed bucket's factor.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::aggregate::Aggregate;
use super::bucketing::{DateWindow, lag_window};
use super::derive::safe_divide;
use super::types::{AggregationKey, MetricRecord};

/// Definition of one lag bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LagBucketDef {
    pub name: String,
    /// Last whole day of lag the bucket covers (inclusive). `None` marks the
    /// terminal bucket, whose upper bound is unbounded.
    #[serde(default)]
    pub last_day: Option<u32>,
    /// Alternative spellings accepted in raw rows (matched case-insensitively).
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl LagBucketDef {
    pub fn bounded(name: &str, last_day: u32, alias: &str) -> Self {
        Self {
            name: name.to_string(),
            last_day: Some(last_day),
            aliases: vec![alias.to_string()],
        }
    }

    pub fn matches(&self, raw: &str) -> bool {
        let raw = raw.trim();
        self.name.eq_ignore_ascii_case(raw) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(raw))
    }
}

/// Name of the terminal bucket and of forecast rows past every bounded bucket.
pub const BEYOND_KNOWN_RANGE: &str = "beyond known range";

/// The Google Ads conversion-lag bucket set.
pub fn default_lag_buckets() -> Vec<LagBucketDef> {
    let mut buckets = vec![
        LagBucketDef::bounded("<1d", 0, "LESS_THAN_ONE_DAY"),
        LagBucketDef::bounded("1-2d", 1, "ONE_TO_TWO_DAYS"),
        LagBucketDef::bounded("2-3d", 2, "TWO_TO_THREE_DAYS"),
        LagBucketDef::bounded("3-4d", 3, "THREE_TO_FOUR_DAYS"),
        LagBucketDef::bounded("4-5d", 4, "FOUR_TO_FIVE_DAYS"),
        LagBucketDef::bounded("5-6d", 5, "FIVE_TO_SIX_DAYS"),
        LagBucketDef::bounded("6-7d", 6, "SIX_TO_SEVEN_DAYS"),
        LagBucketDef::bounded("7-8d", 7, "SEVEN_TO_EIGHT_DAYS"),
        LagBucketDef::bounded("8-9d", 8, "EIGHT_TO_NINE_DAYS"),
        LagBucketDef::bounded("9-10d", 9, "NINE_TO_TEN_DAYS"),
        LagBucketDef::bounded("10-11d", 10, "TEN_TO_ELEVEN_DAYS"),
        LagBucketDef::bounded("11-12d", 11, "ELEVEN_TO_TWELVE_DAYS"),
        LagBucketDef::bounded("12-13d", 12, "TWELVE_TO_THIRTEEN_DAYS"),
        LagBucketDef::bounded("13-14d", 13, "THIRTEEN_TO_FOURTEEN_DAYS"),
        LagBucketDef::bounded("14-21d", 20, "FOURTEEN_TO_TWENTY_ONE_DAYS"),
        LagBucketDef::bounded("21-30d", 29, "TWENTY_ONE_TO_THIRTY_DAYS"),
        LagBucketDef::bounded("30-45d", 44, "THIRTY_TO_FORTY_FIVE_DAYS"),
        LagBucketDef::bounded("45-60d", 59, "FORTY_FIVE_TO_SIXTY_DAYS"),
        LagBucketDef::bounded("60-90d", 89, "SIXTY_TO_NINETY_DAYS"),
    ];
    buckets.push(LagBucketDef {
        name: BEYOND_KNOWN_RANGE.to_string(),
        last_day: None,
        aliases: vec!["UNKNOWN".to_string(), "NINETY_PLUS_DAYS".to_string()],
    });
    buckets
}

/// Find the bucket a raw bucket name refers to.
pub fn resolve_bucket<'a>(buckets: &'a [LagBucketDef], raw: &str) -> Option<&'a LagBucketDef> {
    buckets.iter().find(|b| b.matches(raw))
}

/// Lag-model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LagConfig {
    /// Length of the historical window in days.
    pub lookback_days: u32,
    /// Days between the end of the window and `today`.
    pub stable_offset_days: u32,
    /// Bucket definitions in ascending-lag order.
    pub buckets: Vec<LagBucketDef>,
}

impl Default for LagConfig {
    fn default() -> Self {
        Self {
            lookback_days: 60,
            stable_offset_days: 30,
            buckets: default_lag_buckets(),
        }
    }
}

/// Derived per-bucket factors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LagFactorRow {
    pub bucket: String,
    pub last_day: Option<u32>,
    pub conversions: f64,
    pub conversion_value: f64,
    /// Bucket conversions / total conversions.
    pub share: f64,
    /// Running sum of `share` through this bucket, capped at 1.
    pub cumulative_share: f64,
    /// `1 / cumulative_share`, or 1 when the cumulative share is 0.
    pub uplift_factor: f64,
}

/// Uplift factor for a cumulative share.
pub fn uplift_for_share(cumulative_share: f64) -> f64 {
    if cumulative_share > 0.0 {
        1.0 / cumulative_share
    } else {
        1.0
    }
}

/// The lag-factor table for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LagModel {
    pub window: DateWindow,
    pub rows: Vec<LagFactorRow>,
    pub total_conversions: f64,
    pub total_value: f64,
    /// Rows dropped for a missing date, an unknown bucket or a date outside the window.
    pub excluded_rows: usize,
}

impl LagModel {
    /// Build the model from lag-learning records.
    pub fn build(records: &[MetricRecord], config: &LagConfig, today: NaiveDate) -> Self {
        let window = lag_window(today, config.lookback_days, config.stable_offset_days);

        let in_window: Vec<MetricRecord> = records
            .iter()
            .filter(|r| r.date.is_some_and(|d| window.contains(d)))
            .cloned()
            .collect();
        let outside_window = records.len() - in_window.len();

        let agg = Aggregate::build(
            "lag_learning",
            &in_window,
            |r| {
                r.lag_bucket
                    .as_deref()
                    .and_then(|raw| resolve_bucket(&config.buckets, raw))
                    .map(|b| AggregationKey::text(b.name.clone()))
            },
            |_| None,
        );

        let total_conversions = agg.totals().conversions;
        let total_value = agg.totals().conversion_value;

        let mut rows: Vec<LagFactorRow> = Vec::with_capacity(agg.len());
        let mut cumulative = 0.0_f64;
        for def in &config.buckets {
            let Some(observed) = agg.get(&AggregationKey::text(def.name.clone())) else {
                continue;
            };
            // Each observed bucket is walked once, at its first definition.
            if rows.iter().any(|r| r.bucket == def.name) {
                continue;
            }
            let share = safe_divide(observed.measures.conversions, total_conversions);
            cumulative = (cumulative + share).min(1.0);
            rows.push(LagFactorRow {
                bucket: def.name.clone(),
                last_day: def.last_day,
                conversions: observed.measures.conversions,
                conversion_value: observed.measures.conversion_value,
                share,
                cumulative_share: cumulative,
                uplift_factor: uplift_for_share(cumulative),
            });
        }

        if rows.is_empty() {
            warn!(
                window_start = %window.start,
                window_end = %window.end,
                input_rows = records.len(),
                "lag model has no observed buckets"
            );
        }
        debug!(
            buckets = rows.len(),
            outside_window,
            excluded = agg.excluded_rows(),
            total_conversions,
            "lag model built"
        );

        Self {
            window,
            rows,
            total_conversions,
            total_value,
            excluded_rows: outside_window + agg.excluded_rows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First observed bounded bucket, in ascending-lag order, whose last day
    /// is at least `days_ago`. `None` when the lag is past every bounded bucket.
    pub fn lookup(&self, days_ago: i64) -> Option<&LagFactorRow> {
        self.rows
            .iter()
            .find(|row| row.last_day.is_some_and(|last| i64::from(last) >= days_ago))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
