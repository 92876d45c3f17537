//! Derived metric computation for aggregate rows.
//!
//! Every ratio goes through [`safe_divide`], so a zero denominator yields
//! `0.0` rather than NaN, Infinity or an error.

use serde::Serialize;

use super::types::Measures;

/// Ratio KPIs computed from summed [`Measures`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DerivedMetrics {
    /// clicks / impressions
    pub ctr: f64,
    /// conversions / clicks
    pub cvr: f64,
    /// cost / conversions
    pub cpa: f64,
    /// conversion value / cost
    pub roas: f64,
    /// conversion value / conversions
    pub aov: f64,
    /// cost / clicks
    pub cpc: f64,
}

/// Division that returns `0.0` when the denominator is zero.
pub fn safe_divide(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Compute all derived metrics from a set of summed measures.
///
/// Totals rows call this on the summed totals, so their ratios are
/// recomputed rather than averaged.
pub fn compute_derived(m: &Measures) -> DerivedMetrics {
    DerivedMetrics {
        ctr: safe_divide(m.clicks, m.impressions),
        cvr: safe_divide(m.conversions, m.clicks),
        cpa: safe_divide(m.cost, m.conversions),
        roas: safe_divide(m.conversion_value, m.cost),
        aov: safe_divide(m.conversion_value, m.conversions),
        cpc: safe_divide(m.cost, m.clicks),
    }
}

/// Cost-weighted rollup: `Σ(share·cost) / Σcost` over items with `cost > 0`.
///
/// Items with zero (or negative) cost are excluded from both sums.
pub fn weighted_share(items: impl IntoIterator<Item = (f64, f64)>) -> f64 {
    let (weighted, weight) = items
        .into_iter()
        .filter(|(_, cost)| *cost > 0.0)
        .fold((0.0, 0.0), |(w, c), (share, cost)| (w + share * cost, c + cost));
    safe_divide(weighted, weight)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
