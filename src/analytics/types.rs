//! Shared types for the analytics engine.
//!
//! Records, aggregation keys, measure accumulators and the error values that
//! flow between the normalizer, the aggregator and the report builder.

use chrono::NaiveDate;
use serde::Serialize;
use smallvec::SmallVec;
use thiserror::Error;

use super::derive::safe_divide;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Table-level degradation.
///
/// Never raised as a failure of the run: the report builder turns each value
/// into a marked table (see [`super::table::TableStatus`]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyticsError {
    /// The feed was available but produced zero usable rows.
    #[error("no data for table '{table}'")]
    NoData { table: String },
    /// The upstream feed (or a model the table depends on) is unavailable.
    #[error("data unavailable for table '{table}': {reason}")]
    Unavailable { table: String, reason: String },
}

/// Convenience alias.
pub type AnalyticsResult<T> = std::result::Result<T, AnalyticsError>;

// ---------------------------------------------------------------------------
// GroupBy
// ---------------------------------------------------------------------------

/// Time-bucket granularity for the trend table.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[default]
    Day,
    Week,
    Month,
}

impl std::fmt::Display for GroupBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Day => write!(f, "day"),
            Self::Week => write!(f, "week"),
            Self::Month => write!(f, "month"),
        }
    }
}

// ---------------------------------------------------------------------------
// Dimensions and keys
// ---------------------------------------------------------------------------

/// A dimension a record can be grouped by.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dim {
    Campaign,
    AdGroup,
    Product,
    Asset,
    Device,
    Date,
    LagBucket,
}

impl std::fmt::Display for Dim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Campaign => write!(f, "campaign"),
            Self::AdGroup => write!(f, "ad_group"),
            Self::Product => write!(f, "product"),
            Self::Asset => write!(f, "asset"),
            Self::Device => write!(f, "device"),
            Self::Date => write!(f, "date"),
            Self::LagBucket => write!(f, "lag_bucket"),
        }
    }
}

/// One component of an [`AggregationKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DimValue {
    Text(String),
    Date(NaiveDate),
}

impl std::fmt::Display for DimValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// Ordered tuple of dimension values identifying one aggregate bucket.
///
/// Equality is exact-value equality over the components; no separator
/// joining is involved, so values containing any character stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregationKey(SmallVec<[DimValue; 2]>);

impl AggregationKey {
    pub fn new(values: impl IntoIterator<Item = DimValue>) -> Self {
        Self(values.into_iter().collect())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new([DimValue::Text(value.into())])
    }

    pub fn date(value: NaiveDate) -> Self {
        Self::new([DimValue::Date(value)])
    }

    /// Build a key from the record's values for `dims`, or `None` when the
    /// record lacks any of them.
    pub fn for_dims(record: &MetricRecord, dims: &[Dim]) -> Option<Self> {
        let mut values = SmallVec::with_capacity(dims.len());
        for dim in dims {
            values.push(record.dim_value(*dim)?);
        }
        Some(Self(values))
    }

    pub fn values(&self) -> &[DimValue] {
        &self.0
    }

    /// First component, if any.
    pub fn first(&self) -> Option<&DimValue> {
        self.0.first()
    }

    /// Human-readable form for sinks and finding sources.
    pub fn display(&self) -> String {
        self.0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

// ---------------------------------------------------------------------------
// MetricRecord
// ---------------------------------------------------------------------------

/// Optional share/rank metrics carried by impression-share rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ShareMetrics {
    pub search_impression_share: Option<f64>,
    pub search_top_impression_share: Option<f64>,
    pub search_rank_lost_impression_share: Option<f64>,
    pub search_budget_lost_impression_share: Option<f64>,
}

/// One normalized row from a report feed. Never mutated after normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricRecord {
    pub campaign_id: Option<String>,
    pub campaign_name: Option<String>,
    pub ad_group_id: Option<String>,
    pub product_id: Option<String>,
    pub product_title: Option<String>,
    pub asset_id: Option<String>,
    pub asset_name: Option<String>,
    pub device: Option<String>,
    pub date: Option<NaiveDate>,
    pub lag_bucket: Option<String>,
    pub measures: Measures,
    /// Daily budget in currency units; `None` when the feed has no budget field.
    pub daily_budget: Option<f64>,
    pub shares: ShareMetrics,
}

impl MetricRecord {
    /// The record's value for `dim`, or `None` when absent.
    pub fn dim_value(&self, dim: Dim) -> Option<DimValue> {
        let text = match dim {
            Dim::Campaign => &self.campaign_id,
            Dim::AdGroup => &self.ad_group_id,
            Dim::Product => &self.product_id,
            Dim::Asset => &self.asset_id,
            Dim::Device => &self.device,
            Dim::LagBucket => &self.lag_bucket,
            Dim::Date => return self.date.map(DimValue::Date),
        };
        text.clone().map(DimValue::Text)
    }

    /// Display name associated with `dim`, when the dimension has one.
    pub fn label_for(&self, dim: Dim) -> Option<&str> {
        match dim {
            Dim::Campaign => self.campaign_name.as_deref(),
            Dim::Product => self.product_title.as_deref(),
            Dim::Asset => self.asset_name.as_deref(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Accumulators
// ---------------------------------------------------------------------------

/// Summed additive measures.
///
/// Built by addition only, so any order of `merge` calls over the same input
/// produces the same sums (up to float associativity).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Measures {
    pub cost: f64,
    pub impressions: f64,
    pub clicks: f64,
    pub conversions: f64,
    pub conversion_value: f64,
}

impl Measures {
    /// Accumulate another set of measures into this one (additive merge).
    pub fn merge(&mut self, other: &Measures) {
        self.cost += other.cost;
        self.impressions += other.impressions;
        self.clicks += other.clicks;
        self.conversions += other.conversions;
        self.conversion_value += other.conversion_value;
    }

    /// Sum an iterator of measures.
    pub fn sum<'a>(items: impl IntoIterator<Item = &'a Measures>) -> Self {
        let mut total = Self::default();
        for m in items {
            total.merge(m);
        }
        total
    }
}

/// Cost-weighted share accumulator: `Σ(share·cost)` and `Σcost` over
/// observations with `cost > 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WeightedShare {
    pub weighted: f64,
    pub weight: f64,
}

impl WeightedShare {
    /// Add one observation. Zero-cost observations are not weights of zero,
    /// they are not observations at all.
    pub fn observe(&mut self, share: Option<f64>, cost: f64) {
        if let Some(share) = share
            && cost > 0.0
        {
            self.weighted += share * cost;
            self.weight += cost;
        }
    }

    pub fn merge(&mut self, other: &WeightedShare) {
        self.weighted += other.weighted;
        self.weight += other.weight;
    }

    pub fn has_observations(&self) -> bool {
        self.weight > 0.0
    }

    /// `Σ(share·cost) / Σcost`, or `None` without observations.
    pub fn value(&self) -> Option<f64> {
        self.has_observations()
            .then(|| safe_divide(self.weighted, self.weight))
    }
}

/// Per-metric weighted share accumulators for one aggregate row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ShareSums {
    pub impression_share: WeightedShare,
    pub top_impression_share: WeightedShare,
    pub rank_lost: WeightedShare,
    pub budget_lost: WeightedShare,
}

impl ShareSums {
    pub fn observe(&mut self, shares: &ShareMetrics, cost: f64) {
        self.impression_share
            .observe(shares.search_impression_share, cost);
        self.top_impression_share
            .observe(shares.search_top_impression_share, cost);
        self.rank_lost
            .observe(shares.search_rank_lost_impression_share, cost);
        self.budget_lost
            .observe(shares.search_budget_lost_impression_share, cost);
    }

    pub fn merge(&mut self, other: &ShareSums) {
        self.impression_share.merge(&other.impression_share);
        self.top_impression_share.merge(&other.top_impression_share);
        self.rank_lost.merge(&other.rank_lost);
        self.budget_lost.merge(&other.budget_lost);
    }
}

/// Descriptive metadata carried alongside an aggregate row.
///
/// Merge rule: prefer non-empty. A later record that supplies a non-empty
/// label (or a present budget) overwrites the current value; an empty or
/// absent value never overwrites.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowMeta {
    pub label: Option<String>,
    pub daily_budget: Option<f64>,
}

impl RowMeta {
    pub fn absorb(&mut self, label: Option<&str>, daily_budget: Option<f64>) {
        if let Some(label) = label.map(str::trim).filter(|l| !l.is_empty()) {
            self.label = Some(label.to_string());
        }
        if daily_budget.is_some() {
            self.daily_budget = daily_budget;
        }
    }

    pub fn merge(&mut self, other: &RowMeta) {
        self.absorb(other.label.as_deref(), other.daily_budget);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
