//! Date handling for analytics windows and time buckets.
//!
//! Parses report dates, formats day/week/month keys, and resolves the
//! inclusive date windows used by the lag model, the forecast and pacing.

use chrono::{Datelike, Days, NaiveDate};
use serde::Serialize;

use super::types::GroupBy;

/// Parse a report date in `YYYY-MM-DD` or `YYYYMMDD` form.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y%m%d"))
        .ok()
}

/// Format a date as an ISO date string (`YYYY-MM-DD`).
pub fn date_to_iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Compute the ISO week key (`YYYY-Www`).
pub fn date_to_iso_week(date: NaiveDate) -> String {
    let iso = date.iso_week();
    format!("{}-W{:02}", iso.year(), iso.week())
}

/// Compute the month key (`YYYY-MM`).
pub fn date_to_month(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Bucket key for `date` at the given granularity.
pub fn group_key(date: NaiveDate, group_by: GroupBy) -> String {
    match group_by {
        GroupBy::Day => date_to_iso(date),
        GroupBy::Week => date_to_iso_week(date),
        GroupBy::Month => date_to_month(date),
    }
}

/// Whole days from `date` to `today` (negative for future dates).
pub fn days_ago(today: NaiveDate, date: NaiveDate) -> i64 {
    (today - date).num_days()
}

/// Number of days in the month containing `date`.
pub fn days_in_month(date: NaiveDate) -> u32 {
    let first = date.with_day(1).unwrap_or(date);
    let next = first
        .checked_add_months(chrono::Months::new(1))
        .unwrap_or(first);
    (next - first).num_days().max(1) as u32
}

/// Inclusive date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Window of `len` days ending at `end` inclusive. `len == 0` yields an
    /// empty window (start after end).
    pub fn ending_at(end: NaiveDate, len: u32) -> Self {
        let start = if len == 0 {
            end.checked_add_days(Days::new(1)).unwrap_or(end)
        } else {
            end.checked_sub_days(Days::new(u64::from(len - 1)))
                .unwrap_or(NaiveDate::MIN)
        };
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Inclusive length in days; 0 for an empty window.
    pub fn len_days(&self) -> u32 {
        ((self.end - self.start).num_days() + 1).max(0) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

/// Lag-learning window: `lookback_days` ending `stable_offset_days` before
/// `today`, so buckets still accumulating conversions are left out.
pub fn lag_window(today: NaiveDate, lookback_days: u32, stable_offset_days: u32) -> DateWindow {
    let end = today
        .checked_sub_days(Days::new(u64::from(stable_offset_days)))
        .unwrap_or(NaiveDate::MIN);
    DateWindow::ending_at(end, lookback_days)
}

/// Recent window of `window_days` ending at `today` inclusive.
pub fn forecast_window(today: NaiveDate, window_days: u32) -> DateWindow {
    DateWindow::ending_at(today, window_days)
}

/// First day of the month through `today`.
pub fn month_to_date(today: NaiveDate) -> DateWindow {
    DateWindow::new(today.with_day(1).unwrap_or(today), today)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parse_both_date_forms() {
        assert_eq!(parse_date("2025-06-15"), Some(d(2025, 6, 15)));
        assert_eq!(parse_date("20250615"), Some(d(2025, 6, 15)));
        assert_eq!(parse_date(" 2025-06-15 "), Some(d(2025, 6, 15)));
        assert_eq!(parse_date("15/06/2025"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn week_key_groups_monday_to_sunday() {
        // 2025-01-06 (Monday) and 2025-01-12 (Sunday) are in ISO week 2025-W02
        assert_eq!(date_to_iso_week(d(2025, 1, 6)), date_to_iso_week(d(2025, 1, 12)));
        assert_eq!(date_to_iso_week(d(2025, 1, 6)), "2025-W02");
    }

    #[test]
    fn month_key_format() {
        assert_eq!(date_to_month(d(2025, 6, 15)), "2025-06");
        assert_eq!(group_key(d(2025, 6, 15), GroupBy::Day), "2025-06-15");
    }

    #[test]
    fn days_in_month_handles_leap_years() {
        assert_eq!(days_in_month(d(2024, 2, 10)), 29);
        assert_eq!(days_in_month(d(2025, 2, 10)), 28);
        assert_eq!(days_in_month(d(2025, 12, 31)), 31);
    }

    #[test]
    fn lag_window_ends_before_today() {
        let w = lag_window(d(2025, 6, 30), 10, 5);
        assert_eq!(w.end, d(2025, 6, 25));
        assert_eq!(w.start, d(2025, 6, 16));
        assert_eq!(w.len_days(), 10);
    }

    #[test]
    fn forecast_window_includes_today() {
        let w = forecast_window(d(2025, 6, 30), 7);
        assert!(w.contains(d(2025, 6, 30)));
        assert!(w.contains(d(2025, 6, 24)));
        assert!(!w.contains(d(2025, 6, 23)));
    }

    #[test]
    fn zero_length_window_is_empty() {
        let w = DateWindow::ending_at(d(2025, 6, 30), 0);
        assert!(w.is_empty());
        assert_eq!(w.len_days(), 0);
        assert!(!w.contains(d(2025, 6, 30)));
    }

    #[test]
    fn month_to_date_starts_on_first() {
        let w = month_to_date(d(2025, 6, 10));
        assert_eq!(w.start, d(2025, 6, 1));
        assert_eq!(w.len_days(), 10);
    }

    #[test]
    fn days_ago_counts_whole_days() {
        assert_eq!(days_ago(d(2025, 6, 10), d(2025, 6, 9)), 1);
        assert_eq!(days_ago(d(2025, 6, 10), d(2025, 6, 10)), 0);
        assert_eq!(days_ago(d(2025, 6, 10), d(2025, 6, 11)), -1);
    }
}
