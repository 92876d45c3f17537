//! Ad-performance analytics: grouped aggregates, ratio KPIs, a conversion-lag
//! forecast, budget pacing and rule-based recommendations.
//!
//! The library performs no I/O. Callers hand [`analytics::build_report`] the
//! upstream feeds and an [`config::AnalyticsConfig`] and get back tables.

pub mod analytics;
pub mod config;
