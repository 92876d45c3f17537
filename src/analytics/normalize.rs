//! Raw row normalization.
//!
//! Rows arrive from the data source as loosely-typed JSON objects: numbers may
//! be strings with thousands separators, currency may be in micros, and any
//! field may be null or missing. Coercion never fails. A value that cannot
//! be read as a number is data (`0`), not an error.

use serde_json::Value;
use tracing::debug;

use super::bucketing::parse_date;
use super::types::{Measures, MetricRecord, ShareMetrics};

/// One row as produced by the data source.
pub type RawRecord = serde_json::Map<String, Value>;

/// Expected numeric type of a raw field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Whole number; fractional input is truncated toward zero.
    Integer,
    Decimal,
    /// Currency expressed in millionths of a unit.
    MicrosCurrency,
}

const MICROS_PER_UNIT: f64 = 1_000_000.0;

/// Parse a numeric string after trimming and stripping thousands separators.
/// Returns `None` for empty, non-numeric or non-finite input.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Read `value` as `kind`, or `None` when it holds no valid number.
pub fn parse_field(value: &Value, kind: FieldKind) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite())?,
        Value::String(s) => parse_number(s)?,
        _ => return None,
    };
    Some(match kind {
        FieldKind::Integer => raw.trunc(),
        FieldKind::Decimal => raw,
        FieldKind::MicrosCurrency => raw / MICROS_PER_UNIT,
    })
}

/// Coerce `value` to a number, defaulting to `0.0`.
pub fn coerce(value: &Value, kind: FieldKind) -> f64 {
    parse_field(value, kind).unwrap_or(0.0)
}

/// Read a dimension value as text. Empty strings and nulls are absent.
pub fn coerce_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// True when a present value is neither blank nor a readable number.
fn is_malformed(value: &Value, kind: FieldKind) -> bool {
    let blank = match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    };
    !blank && parse_field(value, kind).is_none()
}

/// Counters for one normalization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub rows: usize,
    /// Present, non-blank values that could not be read and were defaulted.
    pub malformed_values: usize,
}

struct RowReader<'a> {
    row: &'a RawRecord,
    malformed: usize,
}

impl<'a> RowReader<'a> {
    fn text(&self, names: &[&str]) -> Option<String> {
        names
            .iter()
            .find_map(|name| self.row.get(*name).and_then(coerce_text))
    }

    /// First present field among `fields`, coerced with its own kind.
    fn number_opt(&mut self, fields: &[(&str, FieldKind)]) -> Option<f64> {
        let row = self.row;
        let (value, kind) = fields
            .iter()
            .find_map(|(name, kind)| row.get(*name).map(|v| (v, *kind)))?;
        if is_malformed(value, kind) {
            self.malformed += 1;
        }
        Some(coerce(value, kind))
    }

    fn number(&mut self, fields: &[(&str, FieldKind)]) -> f64 {
        self.number_opt(fields).unwrap_or(0.0)
    }
}

/// Normalize one raw row. Returns the record and the number of malformed
/// values that were defaulted.
pub fn normalize_record(row: &RawRecord) -> (MetricRecord, usize) {
    use FieldKind::{Decimal, Integer, MicrosCurrency};

    let mut r = RowReader { row, malformed: 0 };

    let measures = Measures {
        cost: r.number(&[("cost_micros", MicrosCurrency), ("cost", Decimal)]),
        impressions: r.number(&[("impressions", Integer)]),
        clicks: r.number(&[("clicks", Integer)]),
        conversions: r.number(&[("conversions", Decimal)]),
        conversion_value: r.number(&[
            ("conversions_value", Decimal),
            ("conversion_value", Decimal),
        ]),
    };
    let daily_budget = r.number_opt(&[
        ("budget_amount_micros", MicrosCurrency),
        ("daily_budget", Decimal),
    ]);
    let shares = ShareMetrics {
        search_impression_share: r.number_opt(&[("search_impression_share", Decimal)]),
        search_top_impression_share: r.number_opt(&[("search_top_impression_share", Decimal)]),
        search_rank_lost_impression_share: r
            .number_opt(&[("search_rank_lost_impression_share", Decimal)]),
        search_budget_lost_impression_share: r
            .number_opt(&[("search_budget_lost_impression_share", Decimal)]),
    };

    let date = match r.text(&["date", "segments_date"]) {
        Some(raw) => {
            let parsed = parse_date(&raw);
            if parsed.is_none() {
                r.malformed += 1;
            }
            parsed
        }
        None => None,
    };

    let record = MetricRecord {
        campaign_id: r.text(&["campaign_id"]),
        campaign_name: r.text(&["campaign_name"]),
        ad_group_id: r.text(&["ad_group_id"]),
        product_id: r.text(&["product_id", "product_item_id"]),
        product_title: r.text(&["product_title"]),
        asset_id: r.text(&["asset_id"]),
        asset_name: r.text(&["asset_name"]),
        device: r.text(&["device"]),
        date,
        lag_bucket: r.text(&["conversion_lag_bucket", "lag_bucket"]),
        measures,
        daily_budget,
        shares,
    };
    (record, r.malformed)
}

/// Normalize a whole feed.
pub fn normalize_feed(feed: &str, rows: &[RawRecord]) -> (Vec<MetricRecord>, NormalizeStats) {
    let mut stats = NormalizeStats {
        rows: rows.len(),
        malformed_values: 0,
    };
    let records = rows
        .iter()
        .map(|row| {
            let (record, malformed) = normalize_record(row);
            stats.malformed_values += malformed;
            record
        })
        .collect();
    debug!(
        feed,
        rows = stats.rows,
        malformed_values = stats.malformed_values,
        "normalized feed"
    );
    (records, stats)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
