//! Budget pacing.
//!
//! Compares period-to-date cost against `daily_budget × days_elapsed`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::aggregate::Aggregate;
use super::bucketing::{days_in_month, month_to_date};
use super::derive::safe_divide;
use super::types::{AggregationKey, Dim, MetricRecord};

/// Pacing thresholds, as ratios of actual to expected cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub low_threshold: f64,
    pub high_threshold: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            low_threshold: 0.9,
            high_threshold: 1.1,
        }
    }
}

/// Pacing classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PacingStatus {
    Over,
    Under,
    OnTrack,
    NotApplicable,
    /// Cost was incurred but no budget is defined.
    NoBudget,
}

impl PacingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Over => "over",
            Self::Under => "under",
            Self::OnTrack => "on-track",
            Self::NotApplicable => "not-applicable",
            Self::NoBudget => "spending without defined budget",
        }
    }
}

impl std::fmt::Display for PacingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one pacing evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PacingEvaluation {
    pub status: PacingStatus,
    pub pace_ratio: f64,
    pub expected_cost: f64,
    pub actual_cost: f64,
}

/// Classify `actual_cost` against `daily_budget × days_elapsed`.
pub fn evaluate_pace(
    daily_budget: Option<f64>,
    actual_cost: f64,
    days_elapsed: u32,
    config: &PacingConfig,
) -> PacingEvaluation {
    let budget = daily_budget.unwrap_or(0.0);
    if budget <= 0.0 {
        let status = if actual_cost > 0.0 {
            PacingStatus::NoBudget
        } else {
            PacingStatus::NotApplicable
        };
        return PacingEvaluation {
            status,
            pace_ratio: 0.0,
            expected_cost: 0.0,
            actual_cost,
        };
    }

    let expected_cost = budget * f64::from(days_elapsed);
    let pace_ratio = safe_divide(actual_cost, expected_cost);
    let status = if pace_ratio > config.high_threshold {
        PacingStatus::Over
    } else if pace_ratio < config.low_threshold {
        if pace_ratio > 0.0 {
            PacingStatus::Under
        } else {
            PacingStatus::NotApplicable
        }
    } else {
        PacingStatus::OnTrack
    };

    PacingEvaluation {
        status,
        pace_ratio,
        expected_cost,
        actual_cost,
    }
}

/// Month-to-date pacing for one campaign.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignPacing {
    pub campaign_id: String,
    pub campaign_name: String,
    pub daily_budget: Option<f64>,
    pub days_elapsed: u32,
    pub days_in_period: u32,
    pub evaluation: PacingEvaluation,
    /// Cost at the current daily run-rate extended to the whole period.
    pub projected_cost: f64,
    /// Budget left for the period spread over the remaining days.
    pub remaining_daily_budget: f64,
}

/// Evaluate month-to-date pacing per campaign.
///
/// `daily` rows supply cost (and possibly budgets); `budgets` supplies budgets
/// for campaigns whose daily rows carry none.
pub fn evaluate_campaigns(
    daily: &[MetricRecord],
    budgets: Option<&Aggregate>,
    config: &PacingConfig,
    today: NaiveDate,
) -> Vec<CampaignPacing> {
    let period = month_to_date(today);
    let days_elapsed = period.len_days();
    let days_in_period = days_in_month(today);
    let remaining_days = days_in_period.saturating_sub(days_elapsed);

    let mtd: Vec<MetricRecord> = daily
        .iter()
        .filter(|r| r.date.is_some_and(|d| period.contains(d)))
        .cloned()
        .collect();
    let by_campaign = Aggregate::by_dims("pacing", &mtd, &[Dim::Campaign]);

    let rows: Vec<CampaignPacing> = by_campaign
        .sorted_by_key()
        .into_iter()
        .map(|row| {
            let fallback = budgets.and_then(|b| b.get(&row.key));
            let daily_budget = row
                .meta
                .daily_budget
                .or_else(|| fallback.and_then(|f| f.meta.daily_budget));
            let campaign_name = row
                .meta
                .label
                .clone()
                .or_else(|| fallback.and_then(|f| f.meta.label.clone()))
                .unwrap_or_else(|| row.key.display());
            let evaluation = evaluate_pace(daily_budget, row.measures.cost, days_elapsed, config);
            let projected_cost = safe_divide(row.measures.cost, f64::from(days_elapsed))
                * f64::from(days_in_period);
            let remaining_budget = (daily_budget.unwrap_or(0.0) * f64::from(days_in_period)
                - row.measures.cost)
                .max(0.0);
            CampaignPacing {
                campaign_id: row.key.display(),
                campaign_name,
                daily_budget,
                days_elapsed,
                days_in_period,
                evaluation,
                projected_cost,
                remaining_daily_budget: safe_divide(remaining_budget, f64::from(remaining_days)),
            }
        })
        .collect();

    debug!(campaigns = rows.len(), days_elapsed, "pacing evaluated");
    rows
}

/// Look up a campaign's pacing status by id.
pub fn status_for(pacing: &[CampaignPacing], key: &AggregationKey) -> Option<PacingStatus> {
    let id = key.display();
    pacing
        .iter()
        .find(|p| p.campaign_id == id)
        .map(|p| p.evaluation.status)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
