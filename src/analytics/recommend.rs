//! Threshold rules over aggregated rows.
//!
//! [`RULES`] is a fixed, ordered list of `(predicate, finding)` pairs. Each
//! rule reads one [`RuleInput`] and the thresholds, and contributes at most one
//! finding; rules never see each other's output. A row on which no rule fires
//! gets a single default finding. Output order is rule order within a row and
//! input order across rows, so identical input yields an identical list.

use serde::{Deserialize, Serialize};

use super::derive::DerivedMetrics;
use super::pacing::PacingStatus;
use super::types::Measures;

/// Recommendation thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    pub target_roas: f64,
    /// A row's CPA above `account CPA × cpa_factor` is flagged.
    pub cpa_factor: f64,
    pub ctr_floor: f64,
    /// The CTR rule only applies from this many impressions.
    pub min_impressions: f64,
    /// The zero-conversion rule only applies from this many clicks.
    pub min_clicks: f64,
    /// Impression share lost (to rank or budget) above this fraction is flagged.
    pub lost_share_threshold: f64,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            target_roas: 4.0,
            cpa_factor: 1.5,
            ctr_floor: 0.01,
            min_impressions: 1000.0,
            min_clicks: 50.0,
            lost_share_threshold: 0.20,
        }
    }
}

/// One emitted finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub area: String,
    pub observation: String,
    pub detail: String,
    /// Where the finding came from, e.g. `campaign:123 (Brand)`.
    pub source: String,
}

/// Everything a rule may read about one row.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleInput {
    pub source: String,
    pub measures: Measures,
    pub derived: DerivedMetrics,
    pub rank_lost_share: Option<f64>,
    pub budget_lost_share: Option<f64>,
    pub pacing: Option<PacingStatus>,
    /// Account-level CPA recomputed from account totals.
    pub account_cpa: f64,
}

/// A threshold rule.
pub struct Rule {
    pub id: &'static str,
    pub fires: fn(&RuleInput, &RecommendationConfig) -> bool,
    pub finding: fn(&RuleInput, &RecommendationConfig) -> Recommendation,
}

fn finding(input: &RuleInput, area: &str, observation: &str, detail: String) -> Recommendation {
    Recommendation {
        area: area.to_string(),
        observation: observation.to_string(),
        detail,
        source: input.source.clone(),
    }
}

/// Rules in evaluation order.
pub const RULES: &[Rule] = &[
    Rule {
        id: "no_conversions",
        fires: |i, c| i.measures.conversions == 0.0 && i.measures.clicks >= c.min_clicks,
        finding: |i, _| {
            finding(
                i,
                "Conversions",
                "No conversions despite significant clicks",
                format!(
                    "{:.0} clicks and {:.2} cost with zero conversions; review targeting, landing page and conversion tracking",
                    i.measures.clicks, i.measures.cost
                ),
            )
        },
    },
    Rule {
        id: "roas_below_target",
        fires: |i, c| i.measures.cost > 0.0 && i.derived.roas < c.target_roas,
        finding: |i, c| {
            finding(
                i,
                "Efficiency",
                "ROAS below target",
                format!("ROAS {:.2} vs target {:.2}", i.derived.roas, c.target_roas),
            )
        },
    },
    Rule {
        id: "cpa_above_account",
        fires: |i, c| {
            i.measures.conversions > 0.0
                && i.account_cpa > 0.0
                && i.derived.cpa > i.account_cpa * c.cpa_factor
        },
        finding: |i, c| {
            finding(
                i,
                "Efficiency",
                "CPA well above account average",
                format!(
                    "CPA {:.2} vs account {:.2} (limit {:.2}x)",
                    i.derived.cpa, i.account_cpa, c.cpa_factor
                ),
            )
        },
    },
    Rule {
        id: "low_ctr",
        fires: |i, c| i.measures.impressions >= c.min_impressions && i.derived.ctr < c.ctr_floor,
        finding: |i, c| {
            finding(
                i,
                "Engagement",
                "CTR below floor",
                format!(
                    "CTR {:.4} on {:.0} impressions (floor {:.4}); refresh ad copy or tighten keywords",
                    i.derived.ctr, i.measures.impressions, c.ctr_floor
                ),
            )
        },
    },
    Rule {
        id: "lost_is_rank",
        fires: |i, c| i.rank_lost_share.is_some_and(|s| s > c.lost_share_threshold),
        finding: |i, _| {
            finding(
                i,
                "Visibility",
                "Impression share lost to rank",
                format!(
                    "{:.4} of eligible impressions lost to ad rank; improve quality or bids",
                    i.rank_lost_share.unwrap_or(0.0)
                ),
            )
        },
    },
    Rule {
        id: "lost_is_budget",
        fires: |i, c| i.budget_lost_share.is_some_and(|s| s > c.lost_share_threshold),
        finding: |i, _| {
            finding(
                i,
                "Budget",
                "Impression share lost to budget",
                format!(
                    "{:.4} of eligible impressions lost to budget; consider raising the budget",
                    i.budget_lost_share.unwrap_or(0.0)
                ),
            )
        },
    },
    Rule {
        id: "pacing_over",
        fires: |i, _| i.pacing == Some(PacingStatus::Over),
        finding: |i, _| {
            finding(
                i,
                "Budget",
                "Spending ahead of budget",
                "month-to-date cost is above the pace implied by the daily budget".to_string(),
            )
        },
    },
    Rule {
        id: "pacing_no_budget",
        fires: |i, _| i.pacing == Some(PacingStatus::NoBudget),
        finding: |i, _| {
            finding(
                i,
                "Budget",
                "Spending without defined budget",
                format!("{:.2} spent with no daily budget set", i.measures.cost),
            )
        },
    },
];

/// Findings for one row, in rule order; a default finding when nothing fires.
pub fn evaluate_row(input: &RuleInput, config: &RecommendationConfig) -> Vec<Recommendation> {
    let mut findings: Vec<Recommendation> = RULES
        .iter()
        .filter(|rule| (rule.fires)(input, config))
        .map(|rule| (rule.finding)(input, config))
        .collect();

    if findings.is_empty() {
        findings.push(if input.measures.conversions > 0.0 {
            finding(
                input,
                "Performance",
                "Healthy",
                format!(
                    "ROAS {:.2}, CPA {:.2}; no thresholds breached",
                    input.derived.roas, input.derived.cpa
                ),
            )
        } else {
            finding(
                input,
                "Performance",
                "Monitor",
                "no thresholds breached yet; not enough data to judge".to_string(),
            )
        });
    }
    findings
}

/// Findings for every row in the given order.
pub fn evaluate_all<'a>(
    inputs: impl IntoIterator<Item = &'a RuleInput>,
    config: &RecommendationConfig,
) -> Vec<Recommendation> {
    inputs
        .into_iter()
        .flat_map(|input| evaluate_row(input, config))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::derive::compute_derived;

    fn input(measures: Measures) -> RuleInput {
        RuleInput {
            source: "campaign:1".into(),
            derived: compute_derived(&measures),
            measures,
            rank_lost_share: None,
            budget_lost_share: None,
            pacing: None,
            account_cpa: 10.0,
        }
    }

    fn observations(findings: &[Recommendation]) -> Vec<&str> {
        findings.iter().map(|f| f.observation.as_str()).collect()
    }

    #[test]
    fn zero_conversions_with_clicks_fires() {
        let i = input(Measures {
            clicks: 80.0,
            impressions: 2000.0,
            cost: 40.0,
            ..Default::default()
        });
        let f = evaluate_row(&i, &RecommendationConfig::default());
        assert_eq!(
            observations(&f),
            vec!["No conversions despite significant clicks", "ROAS below target"]
        );
    }

    #[test]
    fn spend_without_conversions_below_click_guard_is_low_roas() {
        let i = input(Measures {
            cost: 200.0,
            impressions: 500.0,
            clicks: 20.0,
            ..Default::default()
        });
        let f = evaluate_row(&i, &RecommendationConfig::default());
        assert_eq!(observations(&f), vec!["ROAS below target"]);
        assert_eq!(f[0].detail, "ROAS 0.00 vs target 4.00");
    }

    #[test]
    fn rules_fire_in_declared_order() {
        let mut i = input(Measures {
            cost: 100.0,
            impressions: 10_000.0,
            clicks: 50.0,
            conversions: 2.0,
            conversion_value: 100.0,
        });
        i.rank_lost_share = Some(0.35);
        i.budget_lost_share = Some(0.25);
        i.pacing = Some(PacingStatus::Over);
        let f = evaluate_row(&i, &RecommendationConfig::default());
        assert_eq!(
            observations(&f),
            vec![
                "ROAS below target",
                "CPA well above account average",
                "CTR below floor",
                "Impression share lost to rank",
                "Impression share lost to budget",
                "Spending ahead of budget",
            ]
        );
    }

    #[test]
    fn healthy_default_when_nothing_fires() {
        let i = input(Measures {
            cost: 10.0,
            impressions: 100.0,
            clicks: 10.0,
            conversions: 2.0,
            conversion_value: 100.0,
        });
        let f = evaluate_row(&i, &RecommendationConfig::default());
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].observation, "Healthy");
        assert_eq!(f[0].source, "campaign:1");
    }

    #[test]
    fn monitor_default_without_conversions() {
        let f = evaluate_row(&input(Measures::default()), &RecommendationConfig::default());
        assert_eq!(observations(&f), vec!["Monitor"]);
    }

    #[test]
    fn lost_share_at_threshold_does_not_fire() {
        let mut i = input(Measures::default());
        i.rank_lost_share = Some(0.20);
        let f = evaluate_row(&i, &RecommendationConfig::default());
        assert_eq!(observations(&f), vec!["Monitor"]);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let inputs = vec![
            input(Measures {
                clicks: 500.0,
                ..Default::default()
            }),
            input(Measures {
                cost: 5.0,
                conversions: 1.0,
                conversion_value: 1.0,
                ..Default::default()
            }),
        ];
        let config = RecommendationConfig::default();
        let a = serde_json::to_string(&evaluate_all(&inputs, &config)).unwrap();
        let b = serde_json::to_string(&evaluate_all(&inputs, &config)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rule_ids_are_unique() {
        let mut ids: Vec<&str> = RULES.iter().map(|r| r.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), RULES.len());
    }
}
