use campaign_insights::analytics::normalize::RawRecord;
use campaign_insights::analytics::{Feed, Measures, MetricRecord};
use chrono::NaiveDate;
use serde_json::{Value, json};

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }

    /// Return captured log lines for fine-grained checks.
    pub fn lines(&self) -> Vec<String> {
        self.output()
            .lines()
            .map(std::string::ToString::to_string)
            .collect()
    }
}

struct TestWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

#[allow(dead_code)]
pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[allow(dead_code)]
pub fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// A raw row from a `json!` object literal.
#[allow(dead_code)]
pub fn raw(value: Value) -> RawRecord {
    value
        .as_object()
        .cloned()
        .expect("raw rows must be JSON objects")
}

/// An available feed from a list of `json!` object literals.
#[allow(dead_code)]
pub fn feed(rows: Vec<Value>) -> Feed {
    Feed::Available(rows.into_iter().map(raw).collect())
}

/// A product row with the five core measures.
#[allow(dead_code)]
pub fn product_row(id: &str, impressions: u64, clicks: u64, conversions: f64, cost: f64, value: f64) -> Value {
    json!({
        "product_id": id,
        "product_title": format!("Product {id}"),
        "impressions": impressions,
        "clicks": clicks,
        "conversions": conversions,
        "cost": cost,
        "conversions_value": value,
    })
}

/// A lag-learning row.
#[allow(dead_code)]
pub fn lag_row(date: NaiveDate, bucket: &str, conversions: f64, value: f64) -> Value {
    json!({
        "date": iso(date),
        "conversion_lag_bucket": bucket,
        "conversions": conversions,
        "conversions_value": value,
    })
}

/// A typed record, bypassing the normalizer.
#[allow(dead_code)]
pub fn record(campaign: Option<&str>, cost: f64, impressions: f64, clicks: f64, conversions: f64, value: f64) -> MetricRecord {
    MetricRecord {
        campaign_id: campaign.map(Into::into),
        measures: Measures {
            cost,
            impressions,
            clicks,
            conversions,
            conversion_value: value,
        },
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() <= 1e-9 * expected.abs().max(1.0),
        "expected {expected}, got {actual}"
    );
}
