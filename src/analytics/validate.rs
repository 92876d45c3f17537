//! Reconciliation checks for a built report.
//!
//! Provides deterministic checks for:
//! - **Sum invariants**: every aggregation's bucket totals plus its excluded
//!   rows equal the raw sums of the records it was built from.
//! - **Exclusions**: rows dropped for a missing dimension.
//! - **Lag model**: cumulative share non-decreasing and within `[0, 1]`.
//! - **Forecast**: applied uplift never above the configured ceiling.
//! - **Feeds**: which upstream reports were unavailable.
//!
//! Output is a structured [`ValidationReport`] attached to the report.

use serde::Serialize;

use super::aggregate::Aggregate;
use super::forecast::Forecast;
use super::lag::LagModel;
use super::types::{Measures, MetricRecord};

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Severity level for a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A single validation check result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Check {
    pub id: String,
    pub ok: bool,
    pub severity: Severity,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

impl Check {
    fn pass(id: String, details: String) -> Self {
        Self {
            id,
            ok: true,
            severity: Severity::Info,
            details,
            suggested_action: None,
        }
    }

    fn fail(id: String, severity: Severity, details: String, action: &str) -> Self {
        Self {
            id,
            ok: false,
            severity,
            details,
            suggested_action: Some(action.to_string()),
        }
    }
}

/// Full validation report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub checks: Vec<Check>,
}

impl ValidationReport {
    pub fn push(&mut self, check: Check) {
        self.checks.push(check);
    }

    /// True if every check passed.
    pub fn all_ok(&self) -> bool {
        self.checks.iter().all(|c| c.ok)
    }

    /// Count of checks that failed with a given severity.
    pub fn count_failures(&self, sev: Severity) -> usize {
        self.checks
            .iter()
            .filter(|c| !c.ok && c.severity == sev)
            .count()
    }

    pub fn get(&self, id: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.id == id)
    }

    /// Produce the JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::json!({"error": "serialization failed"}))
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tolerances for the numeric checks.
#[derive(Debug, Clone)]
pub struct ValidateConfig {
    /// Relative tolerance for sum comparisons (scaled by `max(1, |expected|)`).
    pub sum_tolerance: f64,
}

impl Default for ValidateConfig {
    fn default() -> Self {
        Self {
            sum_tolerance: 1e-9,
        }
    }
}

fn close(actual: f64, expected: f64, tolerance: f64) -> bool {
    (actual - expected).abs() <= tolerance * expected.abs().max(1.0)
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

/// Bucket totals plus excluded measures must equal the raw record sums.
pub fn check_sums(agg: &Aggregate, records: &[MetricRecord], config: &ValidateConfig) -> Check {
    let id = format!("sums.{}", agg.name());
    let raw = Measures::sum(records.iter().map(|r| &r.measures));
    let mut accounted = agg.totals();
    accounted.merge(&agg.excluded_measures());

    let fields = [
        ("cost", accounted.cost, raw.cost),
        ("impressions", accounted.impressions, raw.impressions),
        ("clicks", accounted.clicks, raw.clicks),
        ("conversions", accounted.conversions, raw.conversions),
        ("conversion_value", accounted.conversion_value, raw.conversion_value),
    ];
    let mismatched: Vec<&str> = fields
        .iter()
        .filter(|(_, actual, expected)| !close(*actual, *expected, config.sum_tolerance))
        .map(|(name, _, _)| *name)
        .collect();

    if mismatched.is_empty() {
        Check::pass(
            id,
            format!(
                "{} buckets reconcile with {} input rows",
                agg.len(),
                records.len()
            ),
        )
    } else {
        Check::fail(
            id,
            Severity::Error,
            format!("aggregate sums differ from input for: {}", mismatched.join(", ")),
            "Report this input set; aggregation must be additive",
        )
    }
}

/// Warn when an aggregation dropped rows for a missing dimension.
pub fn check_exclusions(agg: &Aggregate) -> Check {
    let id = format!("excluded.{}", agg.name());
    if agg.excluded_rows() == 0 {
        Check::pass(id, format!("all {} rows carried the grouping key", agg.input_rows()))
    } else {
        Check::fail(
            id,
            Severity::Warning,
            format!(
                "{}/{} rows lacked a required dimension and were excluded",
                agg.excluded_rows(),
                agg.input_rows()
            ),
            "Check the report's field selection for the grouping dimension",
        )
    }
}

/// Cumulative share must be non-decreasing and within `[0, 1]`.
pub fn check_lag_model(model: &LagModel) -> Vec<Check> {
    let monotone = model
        .rows
        .windows(2)
        .all(|w| w[1].cumulative_share >= w[0].cumulative_share);
    let bounded = model
        .rows
        .iter()
        .all(|r| (0.0..=1.0).contains(&r.cumulative_share));

    let mut checks = Vec::with_capacity(2);
    checks.push(if monotone {
        Check::pass(
            "lag.cumulative_monotone".into(),
            format!("{} buckets in ascending-lag order", model.rows.len()),
        )
    } else {
        Check::fail(
            "lag.cumulative_monotone".into(),
            Severity::Error,
            "cumulative share decreases between buckets".into(),
            "Check the lag bucket order in the configuration",
        )
    });
    checks.push(if bounded {
        Check::pass(
            "lag.cumulative_bounded".into(),
            "cumulative share within [0, 1]".into(),
        )
    } else {
        Check::fail(
            "lag.cumulative_bounded".into(),
            Severity::Error,
            "cumulative share outside [0, 1]".into(),
            "Check lag-learning rows for negative conversions",
        )
    });
    checks
}

/// Applied uplift must not exceed the ceiling.
pub fn check_forecast(forecast: &Forecast, max_uplift: f64) -> Check {
    let over = forecast
        .rows
        .iter()
        .filter(|r| r.uplift.applied_uplift > max_uplift)
        .count();
    let clamped = forecast
        .rows
        .iter()
        .filter(|r| r.uplift.uplift_factor > r.uplift.applied_uplift)
        .count();
    if over == 0 {
        Check::pass(
            "forecast.uplift_clamped".into(),
            format!(
                "{} days forecast, {clamped} clamped at {max_uplift:.2}",
                forecast.rows.len()
            ),
        )
    } else {
        Check::fail(
            "forecast.uplift_clamped".into(),
            Severity::Error,
            format!("{over} days applied an uplift above {max_uplift:.2}"),
            "Check forecast.max_uplift",
        )
    }
}

/// Record an unavailable upstream feed.
pub fn check_feed(feed: &str, unavailable_reason: Option<&str>) -> Check {
    let id = format!("feeds.{feed}");
    match unavailable_reason {
        None => Check::pass(id, "feed available".into()),
        Some(reason) => Check::fail(
            id,
            Severity::Warning,
            format!("feed unavailable: {reason}"),
            "Re-run the upstream fetch for this report",
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
