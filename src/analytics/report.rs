//! Report assembly.
//!
//! [`build_report`] normalizes each input feed once and then builds every
//! feature table independently. A table whose inputs are missing is emitted
//! with an `unavailable` or `no_data` status; its siblings are unaffected.
//! The only cross-table dependency is lag model → forecast.

use std::time::Instant;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::aggregate::{Aggregate, AggregateRow};
use super::bucketing::group_key;
use super::derive::{compute_derived, safe_divide};
use super::forecast::{Forecast, apply_forecast};
use super::lag::LagModel;
use super::normalize::{RawRecord, normalize_feed};
use super::pacing::{CampaignPacing, evaluate_campaigns, status_for};
use super::recommend::{Recommendation, RuleInput, evaluate_all};
use super::table::{Cell, Column, ColumnKind, Table};
use super::types::{
    AggregationKey, AnalyticsError, AnalyticsResult, Dim, DimValue, Measures, MetricRecord,
    ShareSums,
};
use super::validate::{
    ValidateConfig, ValidationReport, check_exclusions, check_feed, check_forecast, check_lag_model,
    check_sums,
};
use crate::config::AnalyticsConfig;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// One upstream report's rows, or the reason it could not be fetched.
#[derive(Debug, Clone, PartialEq)]
pub enum Feed {
    Available(Vec<RawRecord>),
    Unavailable(String),
}

impl Default for Feed {
    fn default() -> Self {
        Self::Unavailable("feed not supplied".to_string())
    }
}

impl Feed {
    /// Interpret one JSON value: an array of row objects, or `{"error": ".."}`.
    /// Array elements that are not objects are skipped.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Array(items) => Self::Available(
                items
                    .iter()
                    .filter_map(|item| item.as_object().cloned())
                    .collect(),
            ),
            Value::Object(obj) => match obj.get("error") {
                Some(Value::String(reason)) => Self::Unavailable(reason.clone()),
                Some(other) => Self::Unavailable(other.to_string()),
                None => Self::Unavailable("feed is an object without rows".to_string()),
            },
            Value::Null => Self::default(),
            _ => Self::Unavailable("feed is not an array of rows".to_string()),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

/// Feed keys accepted by [`ReportInputs::from_json`], in report order.
pub const FEED_NAMES: [&str; 7] = [
    "campaign",
    "daily",
    "product",
    "asset",
    "impression_share",
    "lag_learning",
    "recent_performance",
];

/// One feed per upstream report type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportInputs {
    pub campaign: Feed,
    pub daily: Feed,
    pub product: Feed,
    pub asset: Feed,
    pub impression_share: Feed,
    pub lag_learning: Feed,
    pub recent_performance: Feed,
}

impl ReportInputs {
    /// Read feeds from a JSON object keyed by report type. Missing keys (or a
    /// non-object document) leave the feed unavailable.
    pub fn from_json(doc: &Value) -> Self {
        let feed = |name: &str| doc.get(name).map(Feed::from_json).unwrap_or_default();
        Self {
            campaign: feed("campaign"),
            daily: feed("daily"),
            product: feed("product"),
            asset: feed("asset"),
            impression_share: feed("impression_share"),
            lag_learning: feed("lag_learning"),
            recent_performance: feed("recent_performance"),
        }
    }

    fn feeds(&self) -> [(&'static str, &Feed); 7] {
        [
            (FEED_NAMES[0], &self.campaign),
            (FEED_NAMES[1], &self.daily),
            (FEED_NAMES[2], &self.product),
            (FEED_NAMES[3], &self.asset),
            (FEED_NAMES[4], &self.impression_share),
            (FEED_NAMES[5], &self.lag_learning),
            (FEED_NAMES[6], &self.recent_performance),
        ]
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Everything handed to the data sink for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsReport {
    pub today: NaiveDate,
    pub tables: Vec<Table>,
    /// Findings in emission order; also rendered as the `recommendations` table.
    #[serde(skip)]
    pub recommendations: Vec<Recommendation>,
    pub validation: ValidationReport,
}

impl AnalyticsReport {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(serde_json::json!({"error": "serialization failed"}))
    }
}

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

const MEASURE_COLUMNS: [Column; 11] = [
    Column::new("impressions", ColumnKind::Integer),
    Column::new("clicks", ColumnKind::Integer),
    Column::new("cost", ColumnKind::Currency),
    Column::new("conversions", ColumnKind::Decimal),
    Column::new("conversion_value", ColumnKind::Currency),
    Column::new("ctr", ColumnKind::Fraction),
    Column::new("cvr", ColumnKind::Fraction),
    Column::new("cpc", ColumnKind::Currency),
    Column::new("cpa", ColumnKind::Currency),
    Column::new("roas", ColumnKind::Decimal),
    Column::new("aov", ColumnKind::Currency),
];

fn performance_columns(key: &'static str) -> Vec<Column> {
    let mut columns = vec![
        Column::new(key, ColumnKind::Text),
        Column::new("name", ColumnKind::Text),
    ];
    columns.extend(MEASURE_COLUMNS);
    columns
}

const IMPRESSION_SHARE_COLUMNS: &[Column] = &[
    Column::new("campaign_id", ColumnKind::Text),
    Column::new("name", ColumnKind::Text),
    Column::new("cost", ColumnKind::Currency),
    Column::new("impressions", ColumnKind::Integer),
    Column::new("search_impression_share", ColumnKind::Fraction),
    Column::new("search_top_impression_share", ColumnKind::Fraction),
    Column::new("search_rank_lost_impression_share", ColumnKind::Fraction),
    Column::new("search_budget_lost_impression_share", ColumnKind::Fraction),
];

const LAG_MODEL_COLUMNS: &[Column] = &[
    Column::new("bucket", ColumnKind::Text),
    Column::new("last_day", ColumnKind::Integer),
    Column::new("conversions", ColumnKind::Decimal),
    Column::new("conversion_value", ColumnKind::Currency),
    Column::new("share", ColumnKind::Fraction),
    Column::new("cumulative_share", ColumnKind::Fraction),
    Column::new("uplift_factor", ColumnKind::Decimal),
];

const FORECAST_COLUMNS: &[Column] = &[
    Column::new("date", ColumnKind::Text),
    Column::new("days_ago", ColumnKind::Integer),
    Column::new("bucket", ColumnKind::Text),
    Column::new("cumulative_share", ColumnKind::Fraction),
    Column::new("uplift_factor", ColumnKind::Decimal),
    Column::new("applied_uplift", ColumnKind::Decimal),
    Column::new("reported_conversions", ColumnKind::Decimal),
    Column::new("adjusted_conversions", ColumnKind::Decimal),
    Column::new("reported_value", ColumnKind::Currency),
    Column::new("adjusted_value", ColumnKind::Currency),
];

const PACING_COLUMNS: &[Column] = &[
    Column::new("campaign_id", ColumnKind::Text),
    Column::new("name", ColumnKind::Text),
    Column::new("daily_budget", ColumnKind::Currency),
    Column::new("days_elapsed", ColumnKind::Integer),
    Column::new("days_in_period", ColumnKind::Integer),
    Column::new("cost", ColumnKind::Currency),
    Column::new("expected_cost", ColumnKind::Currency),
    Column::new("pace_ratio", ColumnKind::Decimal),
    Column::new("status", ColumnKind::Text),
    Column::new("projected_cost", ColumnKind::Currency),
    Column::new("remaining_daily_budget", ColumnKind::Currency),
];

const RECOMMENDATION_COLUMNS: &[Column] = &[
    Column::new("area", ColumnKind::Text),
    Column::new("observation", ColumnKind::Text),
    Column::new("detail", ColumnKind::Text),
    Column::new("source", ColumnKind::Text),
];

fn measure_cells(m: &Measures) -> Vec<Cell> {
    let d = compute_derived(m);
    vec![
        m.impressions.into(),
        m.clicks.into(),
        m.cost.into(),
        m.conversions.into(),
        m.conversion_value.into(),
        d.ctr.into(),
        d.cvr.into(),
        d.cpc.into(),
        d.cpa.into(),
        d.roas.into(),
        d.aov.into(),
    ]
}

/// Rows in the given order plus a totals row whose ratios are recomputed
/// from the summed measures.
fn performance_table(name: &str, key_column: &'static str, rows: &[&AggregateRow]) -> Table {
    let mut table = Table::new(name, &performance_columns(key_column));
    for row in rows {
        let mut cells = vec![Cell::text(row.key.display()), Cell::text(row.display_name())];
        cells.extend(measure_cells(&row.measures));
        table.push_row(cells);
    }
    let totals = Measures::sum(rows.iter().map(|r| &r.measures));
    let mut cells = vec![Cell::text("Total"), Cell::Empty];
    cells.extend(measure_cells(&totals));
    table.set_totals(cells);
    table
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

type Normalized = Result<Vec<MetricRecord>, String>;

fn normalize(name: &str, feed: &Feed, config: &AnalyticsConfig, ranged: bool) -> Normalized {
    match feed {
        Feed::Unavailable(reason) => {
            warn!(feed = name, %reason, "feed unavailable");
            Err(reason.clone())
        }
        Feed::Available(rows) => {
            let (mut records, _) = normalize_feed(name, rows);
            if ranged {
                records.retain(|r| config.in_range(r.date));
            }
            Ok(records)
        }
    }
}

fn available<'a>(table: &str, feed: &'a Normalized) -> AnalyticsResult<&'a [MetricRecord]> {
    feed.as_deref().map_err(|reason| AnalyticsError::Unavailable {
        table: table.to_string(),
        reason: reason.clone(),
    })
}

fn require_rows(table: &str, agg: &Aggregate) -> AnalyticsResult<()> {
    if agg.is_empty() {
        Err(AnalyticsError::NoData {
            table: table.to_string(),
        })
    } else {
        Ok(())
    }
}

fn or_marked(result: AnalyticsResult<Table>, columns: &[Column]) -> Table {
    result.unwrap_or_else(|err| Table::from_error(&err, columns))
}

struct Builder<'a> {
    config: &'a AnalyticsConfig,
    validate: ValidateConfig,
    checks: ValidationReport,
}

impl Builder<'_> {
    /// Aggregate an available feed and record its reconciliation checks.
    fn aggregate(&mut self, name: &str, records: &[MetricRecord], dims: &[Dim]) -> Aggregate {
        let agg = Aggregate::by_dims(name, records, dims);
        self.checks.push(check_sums(&agg, records, &self.validate));
        self.checks.push(check_exclusions(&agg));
        agg
    }

    fn ranked_table(
        &mut self,
        name: &str,
        key_column: &'static str,
        feed: &Normalized,
        dim: Dim,
        rank: fn(&AggregateRow) -> f64,
    ) -> AnalyticsResult<Table> {
        let records = available(name, feed)?;
        let agg = self.aggregate(name, records, &[dim]);
        require_rows(name, &agg)?;
        Ok(performance_table(name, key_column, &agg.ranked_by(rank)))
    }

    fn daily_trend(&mut self, feed: &Normalized) -> AnalyticsResult<Table> {
        const NAME: &str = "daily_trend";
        let records = available(NAME, feed)?;
        let daily = self.aggregate(NAME, records, &[Dim::Date]);
        let group_by = self.config.trend_group_by;
        let grouped = daily.regroup(NAME, |key| match key.first() {
            Some(DimValue::Date(date)) => Some(AggregationKey::text(group_key(*date, group_by))),
            _ => None,
        });
        require_rows(NAME, &grouped)?;
        Ok(performance_table(NAME, "period", &grouped.sorted_by_key()))
    }

    fn impression_share(&mut self, feed: &Normalized) -> AnalyticsResult<(Table, Aggregate)> {
        const NAME: &str = "impression_share";
        let records = available(NAME, feed)?;
        let agg = self.aggregate(NAME, records, &[Dim::Campaign]);
        require_rows(NAME, &agg)?;

        let rows = agg.ranked_by(|r| r.measures.cost);
        let mut table = Table::new(NAME, IMPRESSION_SHARE_COLUMNS);
        for row in &rows {
            table.push_row(vec![
                Cell::text(row.key.display()),
                Cell::text(row.display_name()),
                row.measures.cost.into(),
                row.measures.impressions.into(),
                Cell::opt(row.shares.impression_share.value()),
                Cell::opt(row.shares.top_impression_share.value()),
                Cell::opt(row.shares.rank_lost.value()),
                Cell::opt(row.shares.budget_lost.value()),
            ]);
        }

        let mut shares = ShareSums::default();
        for row in &rows {
            shares.merge(&row.shares);
        }
        let totals = agg.totals();
        table.set_totals(vec![
            Cell::text("Total"),
            Cell::Empty,
            totals.cost.into(),
            totals.impressions.into(),
            Cell::opt(shares.impression_share.value()),
            Cell::opt(shares.top_impression_share.value()),
            Cell::opt(shares.rank_lost.value()),
            Cell::opt(shares.budget_lost.value()),
        ]);
        Ok((table, agg))
    }

    fn lag_model(&mut self, feed: &Normalized) -> AnalyticsResult<(Table, LagModel)> {
        const NAME: &str = "lag_model";
        let records = available(NAME, feed)?;
        let model = LagModel::build(records, &self.config.lag, self.config.today);
        for check in check_lag_model(&model) {
            self.checks.push(check);
        }
        if model.is_empty() {
            return Err(AnalyticsError::NoData {
                table: NAME.to_string(),
            });
        }

        let mut table = Table::new(NAME, LAG_MODEL_COLUMNS);
        for row in &model.rows {
            table.push_row(vec![
                Cell::text(&row.bucket),
                Cell::opt(row.last_day.map(f64::from)),
                row.conversions.into(),
                row.conversion_value.into(),
                row.share.into(),
                row.cumulative_share.into(),
                row.uplift_factor.into(),
            ]);
        }
        table.set_totals(vec![
            Cell::text("Total"),
            Cell::Empty,
            model.total_conversions.into(),
            model.total_value.into(),
            Cell::Empty,
            Cell::Empty,
            Cell::Empty,
        ]);
        Ok((table, model))
    }

    fn forecast(
        &mut self,
        feed: &Normalized,
        model: Result<&LagModel, &AnalyticsError>,
    ) -> AnalyticsResult<Table> {
        const NAME: &str = "forecast";
        let model = model.map_err(|err| {
            warn!(%err, "lag model unavailable; forecast skipped");
            AnalyticsError::Unavailable {
                table: NAME.to_string(),
                reason: format!("lag model unavailable: {err}"),
            }
        })?;
        let records = available(NAME, feed)?;
        let forecast: Forecast = apply_forecast(records, model, &self.config.forecast, self.config.today);
        self.checks
            .push(check_forecast(&forecast, self.config.forecast.max_uplift));
        if forecast.is_empty() {
            return Err(AnalyticsError::NoData {
                table: NAME.to_string(),
            });
        }

        let mut table = Table::new(NAME, FORECAST_COLUMNS);
        for row in &forecast.rows {
            table.push_row(vec![
                Cell::text(row.date.format("%Y-%m-%d").to_string()),
                (row.days_ago as f64).into(),
                Cell::text(&row.uplift.bucket),
                Cell::opt(row.uplift.cumulative_share),
                row.uplift.uplift_factor.into(),
                row.uplift.applied_uplift.into(),
                row.reported.conversions.into(),
                row.adjusted_conversions.into(),
                row.reported.conversion_value.into(),
                row.adjusted_value.into(),
            ]);
        }
        table.set_totals(vec![
            Cell::text("Total"),
            Cell::Empty,
            Cell::Empty,
            Cell::Empty,
            Cell::Empty,
            forecast.overall_uplift().into(),
            forecast.reported_conversions().into(),
            forecast.adjusted_conversions().into(),
            forecast.reported_value().into(),
            forecast.adjusted_value().into(),
        ]);
        Ok(table)
    }

    fn pacing(
        &mut self,
        feed: &Normalized,
        budgets: Option<&Aggregate>,
    ) -> AnalyticsResult<(Table, Vec<CampaignPacing>)> {
        const NAME: &str = "pacing";
        let records = available(NAME, feed)?;
        let pacing = evaluate_campaigns(records, budgets, &self.config.pacing, self.config.today);
        if pacing.is_empty() {
            return Err(AnalyticsError::NoData {
                table: NAME.to_string(),
            });
        }

        let mut table = Table::new(NAME, PACING_COLUMNS);
        for p in &pacing {
            table.push_row(vec![
                Cell::text(&p.campaign_id),
                Cell::text(&p.campaign_name),
                Cell::opt(p.daily_budget),
                f64::from(p.days_elapsed).into(),
                f64::from(p.days_in_period).into(),
                p.evaluation.actual_cost.into(),
                p.evaluation.expected_cost.into(),
                p.evaluation.pace_ratio.into(),
                Cell::text(p.evaluation.status.as_str()),
                p.projected_cost.into(),
                p.remaining_daily_budget.into(),
            ]);
        }
        let cost: f64 = pacing.iter().map(|p| p.evaluation.actual_cost).sum();
        let expected: f64 = pacing.iter().map(|p| p.evaluation.expected_cost).sum();
        // The account pace compares budgeted spend only.
        let budgeted_cost: f64 = pacing
            .iter()
            .filter(|p| p.evaluation.expected_cost > 0.0)
            .map(|p| p.evaluation.actual_cost)
            .sum();
        table.set_totals(vec![
            Cell::text("Total"),
            Cell::Empty,
            pacing.iter().filter_map(|p| p.daily_budget).sum::<f64>().into(),
            Cell::Empty,
            Cell::Empty,
            cost.into(),
            expected.into(),
            safe_divide(budgeted_cost, expected).into(),
            Cell::Empty,
            pacing.iter().map(|p| p.projected_cost).sum::<f64>().into(),
            pacing.iter().map(|p| p.remaining_daily_budget).sum::<f64>().into(),
        ]);
        Ok((table, pacing))
    }

    fn recommendations(
        &mut self,
        campaigns: Result<&Aggregate, &AnalyticsError>,
        shares: Option<&Aggregate>,
        pacing: &[CampaignPacing],
    ) -> AnalyticsResult<(Table, Vec<Recommendation>)> {
        const NAME: &str = "recommendations";
        let campaigns = campaigns.map_err(|err| match err {
            AnalyticsError::NoData { .. } => AnalyticsError::NoData {
                table: NAME.to_string(),
            },
            AnalyticsError::Unavailable { reason, .. } => AnalyticsError::Unavailable {
                table: NAME.to_string(),
                reason: reason.clone(),
            },
        })?;

        let totals = campaigns.totals();
        let account_cpa = safe_divide(totals.cost, totals.conversions);
        let inputs: Vec<RuleInput> = campaigns
            .ranked_by(|r| r.measures.cost)
            .into_iter()
            .map(|row| {
                let share_row = shares.and_then(|s| s.get(&row.key));
                RuleInput {
                    source: format!("campaign:{} ({})", row.key.display(), row.display_name()),
                    measures: row.measures,
                    derived: row.derived(),
                    rank_lost_share: share_row.and_then(|s| s.shares.rank_lost.value()),
                    budget_lost_share: share_row.and_then(|s| s.shares.budget_lost.value()),
                    pacing: status_for(pacing, &row.key),
                    account_cpa,
                }
            })
            .collect();
        let findings = evaluate_all(&inputs, &self.config.recommend);

        let mut table = Table::new(NAME, RECOMMENDATION_COLUMNS);
        for f in &findings {
            table.push_row(vec![
                Cell::text(&f.area),
                Cell::text(&f.observation),
                Cell::text(&f.detail),
                Cell::text(&f.source),
            ]);
        }
        Ok((table, findings))
    }
}

/// Build every feature table from the supplied feeds.
pub fn build_report(inputs: &ReportInputs, config: &AnalyticsConfig) -> AnalyticsReport {
    let started = Instant::now();
    let mut b = Builder {
        config,
        validate: ValidateConfig::default(),
        checks: ValidationReport::default(),
    };

    for (name, feed) in inputs.feeds() {
        let reason = match feed {
            Feed::Available(_) => None,
            Feed::Unavailable(reason) => Some(reason.as_str()),
        };
        b.checks.push(check_feed(name, reason));
    }

    let campaign = normalize("campaign", &inputs.campaign, config, true);
    let product = normalize("product", &inputs.product, config, true);
    let asset = normalize("asset", &inputs.asset, config, true);
    let impression_share = normalize("impression_share", &inputs.impression_share, config, true);
    let lag_learning = normalize("lag_learning", &inputs.lag_learning, config, false);
    let recent = normalize("recent_performance", &inputs.recent_performance, config, false);
    // Pacing reads the unranged daily rows; it has its own month-to-date window.
    let pacing_daily = normalize("daily", &inputs.daily, config, false);
    let daily = pacing_daily.clone().map(|mut records| {
        records.retain(|r| config.in_range(r.date));
        records
    });

    let campaign_agg: AnalyticsResult<Aggregate> =
        available("campaigns", &campaign).and_then(|records| {
            let agg = b.aggregate("campaigns", records, &[Dim::Campaign]);
            require_rows("campaigns", &agg)?;
            Ok(agg)
        });

    let mut tables = Vec::with_capacity(10);
    let campaign_columns = performance_columns("campaign_id");
    tables.push(or_marked(
        campaign_agg
            .as_ref()
            .map(|agg| performance_table("campaigns", "campaign_id", &agg.ranked_by(|r| r.measures.cost)))
            .map_err(|err| err.clone()),
        &campaign_columns,
    ));

    let products = b.ranked_table("products", "product_id", &product, Dim::Product, |r| {
        r.measures.conversions
    });
    tables.push(or_marked(products, &performance_columns("product_id")));

    let devices = b.ranked_table("devices", "device", &campaign, Dim::Device, |r| r.measures.cost);
    tables.push(or_marked(devices, &performance_columns("device")));

    let trend = b.daily_trend(&daily);
    tables.push(or_marked(trend, &performance_columns("period")));

    let assets = b.ranked_table("assets", "asset_id", &asset, Dim::Asset, |r| r.measures.cost);
    tables.push(or_marked(assets, &performance_columns("asset_id")));

    let share_agg = match b.impression_share(&impression_share) {
        Ok((table, agg)) => {
            tables.push(table);
            Some(agg)
        }
        Err(err) => {
            tables.push(Table::from_error(&err, IMPRESSION_SHARE_COLUMNS));
            None
        }
    };

    let model = match b.lag_model(&lag_learning) {
        Ok((table, model)) => {
            tables.push(table);
            Ok(model)
        }
        Err(err) => {
            tables.push(Table::from_error(&err, LAG_MODEL_COLUMNS));
            Err(err)
        }
    };

    let forecast = b.forecast(&recent, model.as_ref());
    tables.push(or_marked(forecast, FORECAST_COLUMNS));

    let pacing = match b.pacing(&pacing_daily, campaign_agg.as_ref().ok()) {
        Ok((table, pacing)) => {
            tables.push(table);
            pacing
        }
        Err(err) => {
            tables.push(Table::from_error(&err, PACING_COLUMNS));
            Vec::new()
        }
    };

    let recommendations = match b.recommendations(campaign_agg.as_ref(), share_agg.as_ref(), &pacing) {
        Ok((table, findings)) => {
            tables.push(table);
            findings
        }
        Err(err) => {
            tables.push(Table::from_error(&err, RECOMMENDATION_COLUMNS));
            Vec::new()
        }
    };

    info!(
        tables = tables.len(),
        marked = tables.iter().filter(|t| !t.is_ok()).count(),
        recommendations = recommendations.len(),
        failed_checks = b.checks.checks.iter().filter(|c| !c.ok).count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "report built"
    );

    AnalyticsReport {
        today: config.today,
        tables,
        recommendations,
        validation: b.checks,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
