//! Fuzz target for raw field coercion.
//!
//! Every value the normalizer sees must coerce to a finite number without
//! panicking, whatever its JSON type or string content.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde_json::{Map, Value};

use campaign_insights::analytics::normalize::{FieldKind, coerce, normalize_record};

#[derive(Arbitrary, Debug)]
enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawValue {
    fn into_json(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(b),
            Self::Int(i) => Value::from(i),
            Self::Float(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
            Self::Text(s) => Value::String(s),
        }
    }
}

#[derive(Arbitrary, Debug)]
struct RowInput {
    fields: Vec<(u8, RawValue)>,
}

const FIELDS: &[&str] = &[
    "cost_micros",
    "cost",
    "impressions",
    "clicks",
    "conversions",
    "conversions_value",
    "budget_amount_micros",
    "search_impression_share",
    "date",
    "campaign_id",
    "device",
    "conversion_lag_bucket",
];

fuzz_target!(|input: RowInput| {
    let mut row = Map::new();
    for (idx, value) in input.fields {
        let name = FIELDS[usize::from(idx) % FIELDS.len()];
        let value = value.into_json();
        for kind in [FieldKind::Integer, FieldKind::Decimal, FieldKind::MicrosCurrency] {
            assert!(coerce(&value, kind).is_finite());
        }
        row.insert(name.to_string(), value);
    }

    let (record, _) = normalize_record(&row);
    let m = record.measures;
    assert!(m.cost.is_finite() && m.impressions.is_finite() && m.clicks.is_finite());
    assert!(m.conversions.is_finite() && m.conversion_value.is_finite());
});
