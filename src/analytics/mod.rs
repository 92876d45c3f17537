//! Campaign analytics engine.
//!
//! A stateless batch transform from upstream report rows to feature tables.
//! Data flows one way: normalize → aggregate → derive, with the lag model and
//! forecast built from their own windows, and pacing and recommendations
//! reading only what earlier passes produced.
//!
//! # Module structure
//!
//! - [`types`]: records, aggregation keys, measure accumulators, error type
//! - [`normalize`]: raw field coercion (nulls, strings, micros)
//! - [`aggregate`]: grouping by key with additive merges
//! - [`derive`]: safe division and ratio KPIs
//! - [`bucketing`]: date parsing, period keys, date windows
//! - [`lag`]: conversion-lag distribution and uplift factors
//! - [`forecast`]: lag-adjusted recent conversions
//! - [`pacing`]: budget pacing classification
//! - [`recommend`]: ordered threshold rules
//! - [`table`]: output table contract
//! - [`report`]: assembly of every feature table
//! - [`validate`]: reconciliation checks attached to a report

pub mod aggregate;
pub mod bucketing;
pub mod derive;
pub mod forecast;
pub mod lag;
pub mod normalize;
pub mod pacing;
pub mod recommend;
pub mod report;
pub mod table;
pub mod types;
pub mod validate;

// Re-export the most commonly used items at the crate::analytics level.
pub use aggregate::{Aggregate, AggregateRow};
pub use derive::{DerivedMetrics, compute_derived, safe_divide};
pub use forecast::{Forecast, ForecastConfig, apply_forecast};
pub use lag::{LagBucketDef, LagConfig, LagFactorRow, LagModel};
pub use normalize::{FieldKind, RawRecord, coerce, normalize_feed, normalize_record};
pub use pacing::{PacingConfig, PacingStatus, evaluate_pace};
pub use recommend::{Recommendation, RecommendationConfig};
pub use report::{AnalyticsReport, Feed, ReportInputs, build_report};
pub use table::{Cell, Column, ColumnKind, Table, TableStatus};
pub use types::{
    AggregationKey, AnalyticsError, AnalyticsResult, Dim, DimValue, GroupBy, Measures,
    MetricRecord,
};
pub use validate::{Severity, ValidationReport};
