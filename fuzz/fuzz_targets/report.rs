//! Fuzz target for whole-report assembly.
//!
//! Arbitrary JSON feed documents must always produce a report with every
//! table present, never a panic.

#![no_main]

use chrono::NaiveDate;
use libfuzzer_sys::fuzz_target;

use campaign_insights::analytics::{ReportInputs, build_report};
use campaign_insights::config::AnalyticsConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(doc) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let Some(today) = NaiveDate::from_ymd_opt(2025, 6, 30) else {
        return;
    };
    let inputs = ReportInputs::from_json(&doc);
    let report = build_report(&inputs, &AnalyticsConfig::for_today(today));
    assert_eq!(report.tables.len(), 10);
});
