//! Grouping records into aggregates.
//!
//! An [`Aggregate`] is built once per pass from a record slice and a key
//! function, then only read. Iteration order over its rows is unspecified;
//! callers that present rows sort them explicitly with [`Aggregate::sorted_by_key`]
//! or [`Aggregate::ranked_by`], both of which break ties on the key.

use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, warn};

use super::derive::{DerivedMetrics, compute_derived};
use super::types::{AggregationKey, Dim, Measures, MetricRecord, RowMeta, ShareSums};

/// One bucket of an aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    #[serde(skip)]
    pub key: AggregationKey,
    pub measures: Measures,
    pub shares: ShareSums,
    pub meta: RowMeta,
    pub record_count: usize,
}

impl AggregateRow {
    fn new(key: AggregationKey) -> Self {
        Self {
            key,
            measures: Measures::default(),
            shares: ShareSums::default(),
            meta: RowMeta::default(),
            record_count: 0,
        }
    }

    fn absorb(&mut self, record: &MetricRecord, label: Option<&str>) {
        self.measures.merge(&record.measures);
        self.shares.observe(&record.shares, record.measures.cost);
        self.meta.absorb(label, record.daily_budget);
        self.record_count += 1;
    }

    fn merge(&mut self, other: &AggregateRow) {
        self.measures.merge(&other.measures);
        self.shares.merge(&other.shares);
        self.meta.merge(&other.meta);
        self.record_count += other.record_count;
    }

    pub fn derived(&self) -> DerivedMetrics {
        compute_derived(&self.measures)
    }

    /// Label if one was seen, else the key's display form.
    pub fn display_name(&self) -> String {
        self.meta
            .label
            .clone()
            .unwrap_or_else(|| self.key.display())
    }
}

/// Records grouped by key with summed measures.
#[derive(Debug, Clone)]
pub struct Aggregate {
    name: String,
    rows: FxHashMap<AggregationKey, AggregateRow>,
    input_rows: usize,
    excluded_rows: usize,
    excluded: Measures,
}

impl Aggregate {
    /// Group `records` by `key_fn`. Records for which `key_fn` returns `None`
    /// lack a required dimension and are excluded (counted, not fatal).
    /// `label_fn` supplies the display name merged into each row's metadata.
    pub fn build<K, L>(name: &str, records: &[MetricRecord], key_fn: K, label_fn: L) -> Self
    where
        K: Fn(&MetricRecord) -> Option<AggregationKey>,
        L: Fn(&MetricRecord) -> Option<&str>,
    {
        let mut rows: FxHashMap<AggregationKey, AggregateRow> = FxHashMap::default();
        let mut excluded_rows = 0_usize;
        let mut excluded = Measures::default();

        for record in records {
            let Some(key) = key_fn(record) else {
                excluded_rows += 1;
                excluded.merge(&record.measures);
                continue;
            };
            rows.entry(key)
                .or_insert_with_key(|k| AggregateRow::new(k.clone()))
                .absorb(record, label_fn(record));
        }

        if excluded_rows > 0 {
            warn!(
                aggregation = name,
                excluded_rows, "records missing a required dimension were excluded"
            );
        }
        debug!(
            aggregation = name,
            input_rows = records.len(),
            buckets = rows.len(),
            "aggregation pass complete"
        );

        Self {
            name: name.to_string(),
            rows,
            input_rows: records.len(),
            excluded_rows,
            excluded,
        }
    }

    /// Group by a list of dimensions; the row label comes from the first
    /// dimension that has one (campaign name, product title, asset name).
    pub fn by_dims(name: &str, records: &[MetricRecord], dims: &[Dim]) -> Self {
        Self::build(
            name,
            records,
            |r| AggregationKey::for_dims(r, dims),
            |r| dims.iter().find_map(|d| r.label_for(*d)),
        )
    }

    /// Re-bucket rows under new keys (e.g. day → week), merging additively.
    /// Rows mapped to `None` are dropped and counted as excluded.
    pub fn regroup<F>(&self, name: &str, key_fn: F) -> Self
    where
        F: Fn(&AggregationKey) -> Option<AggregationKey>,
    {
        let mut rows: FxHashMap<AggregationKey, AggregateRow> = FxHashMap::default();
        let mut excluded_rows = self.excluded_rows;
        let mut excluded = self.excluded;

        for row in self.rows.values() {
            match key_fn(&row.key) {
                Some(key) => rows
                    .entry(key)
                    .or_insert_with_key(|k| AggregateRow::new(k.clone()))
                    .merge(row),
                None => {
                    excluded_rows += row.record_count;
                    excluded.merge(&row.measures);
                }
            }
        }

        Self {
            name: name.to_string(),
            rows,
            input_rows: self.input_rows,
            excluded_rows,
            excluded,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn input_rows(&self) -> usize {
        self.input_rows
    }

    pub fn excluded_rows(&self) -> usize {
        self.excluded_rows
    }

    /// Summed measures of the excluded records.
    pub fn excluded_measures(&self) -> Measures {
        self.excluded
    }

    pub fn get(&self, key: &AggregationKey) -> Option<&AggregateRow> {
        self.rows.get(key)
    }

    /// Rows in unspecified order.
    pub fn rows(&self) -> impl Iterator<Item = &AggregateRow> {
        self.rows.values()
    }

    /// Sum of all bucket measures.
    pub fn totals(&self) -> Measures {
        Measures::sum(self.rows.values().map(|r| &r.measures))
    }

    /// Rows sorted ascending by key.
    pub fn sorted_by_key(&self) -> Vec<&AggregateRow> {
        let mut rows: Vec<&AggregateRow> = self.rows.values().collect();
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        rows
    }

    /// Rows sorted descending by `metric`, ties broken by ascending key.
    pub fn ranked_by<F>(&self, metric: F) -> Vec<&AggregateRow>
    where
        F: Fn(&AggregateRow) -> f64,
    {
        let mut rows = self.sorted_by_key();
        rows.sort_by(|a, b| metric(b).total_cmp(&metric(a)));
        rows
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
