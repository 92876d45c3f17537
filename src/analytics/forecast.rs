//! Lag-adjusted forecast for recent days.
//!
//! Each recent day's reported conversions are scaled by the uplift factor of
//! the lag bucket its age falls in, clamped to a configurable ceiling.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::aggregate::Aggregate;
use super::bucketing::{DateWindow, days_ago, forecast_window};
use super::derive::safe_divide;
use super::lag::{BEYOND_KNOWN_RANGE, LagModel};
use super::types::{Dim, DimValue, Measures, MetricRecord};

/// Forecast parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Number of recent days (ending today, inclusive) to adjust.
    pub window_days: u32,
    /// Ceiling on the applied uplift factor. A tunable, not a constant of the
    /// model: a near-zero cumulative share would otherwise extrapolate wildly.
    pub max_uplift: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            window_days: 7,
            max_uplift: 5.0,
        }
    }
}

/// The uplift chosen for one lag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedUplift {
    /// Bucket name, or [`BEYOND_KNOWN_RANGE`].
    pub bucket: String,
    pub beyond_known_range: bool,
    pub cumulative_share: Option<f64>,
    /// Unclamped factor from the model (1 when beyond range).
    pub uplift_factor: f64,
    /// `min(uplift_factor, max_uplift)`.
    pub applied_uplift: f64,
}

/// Pick the uplift for a record `days_ago` days old.
pub fn uplift_for_lag(model: &LagModel, days_ago: i64, max_uplift: f64) -> AppliedUplift {
    match model.lookup(days_ago) {
        Some(row) => AppliedUplift {
            bucket: row.bucket.clone(),
            beyond_known_range: false,
            cumulative_share: Some(row.cumulative_share),
            uplift_factor: row.uplift_factor,
            applied_uplift: row.uplift_factor.min(max_uplift),
        },
        None => AppliedUplift {
            bucket: BEYOND_KNOWN_RANGE.to_string(),
            beyond_known_range: true,
            cumulative_share: None,
            uplift_factor: 1.0,
            applied_uplift: 1.0_f64.min(max_uplift),
        },
    }
}

/// One forecast day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRow {
    pub date: NaiveDate,
    pub days_ago: i64,
    pub uplift: AppliedUplift,
    pub reported: Measures,
    pub adjusted_conversions: f64,
    pub adjusted_value: f64,
}

/// Forecast over the recent window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub window: DateWindow,
    /// Ascending by date.
    pub rows: Vec<ForecastRow>,
}

impl Forecast {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn reported_conversions(&self) -> f64 {
        self.rows.iter().map(|r| r.reported.conversions).sum()
    }

    pub fn adjusted_conversions(&self) -> f64 {
        self.rows.iter().map(|r| r.adjusted_conversions).sum()
    }

    pub fn reported_value(&self) -> f64 {
        self.rows.iter().map(|r| r.reported.conversion_value).sum()
    }

    pub fn adjusted_value(&self) -> f64 {
        self.rows.iter().map(|r| r.adjusted_value).sum()
    }

    /// Overall uplift, recomputed from the totals.
    pub fn overall_uplift(&self) -> f64 {
        safe_divide(self.adjusted_conversions(), self.reported_conversions())
    }
}

/// Apply the lag model to recent-performance records.
pub fn apply_forecast(
    recent: &[MetricRecord],
    model: &LagModel,
    config: &ForecastConfig,
    today: NaiveDate,
) -> Forecast {
    let window = forecast_window(today, config.window_days);
    let in_window: Vec<MetricRecord> = recent
        .iter()
        .filter(|r| r.date.is_some_and(|d| window.contains(d)))
        .cloned()
        .collect();

    let per_day = Aggregate::by_dims("recent_performance", &in_window, &[Dim::Date]);

    let rows: Vec<ForecastRow> = per_day
        .sorted_by_key()
        .into_iter()
        .filter_map(|row| match row.key.first() {
            Some(DimValue::Date(date)) => Some((*date, row.measures)),
            _ => None,
        })
        .map(|(date, reported)| {
            let age = days_ago(today, date);
            let uplift = uplift_for_lag(model, age, config.max_uplift);
            ForecastRow {
                date,
                days_ago: age,
                adjusted_conversions: reported.conversions * uplift.applied_uplift,
                adjusted_value: reported.conversion_value * uplift.applied_uplift,
                uplift,
                reported,
            }
        })
        .collect();

    debug!(
        days = rows.len(),
        dropped = recent.len() - in_window.len(),
        "forecast applied"
    );

    Forecast { window, rows }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
