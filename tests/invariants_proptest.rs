mod util;

use campaign_insights::analytics::derive::weighted_share;
use campaign_insights::analytics::forecast::uplift_for_lag;
use campaign_insights::analytics::lag::{LagConfig, LagModel, default_lag_buckets};
use campaign_insights::analytics::pacing::{PacingConfig, PacingStatus, evaluate_pace};
use campaign_insights::analytics::types::ShareMetrics;
use campaign_insights::analytics::{
    Aggregate, Dim, FieldKind, Measures, MetricRecord, coerce, safe_divide,
};
use chrono::{Days, NaiveDate};
use proptest::prelude::*;
use serde_json::Value;
use util::date;

fn measure() -> impl Strategy<Value = f64> {
    prop_oneof![Just(0.0), 0.0f64..10_000.0, (0u32..5_000).prop_map(f64::from)]
}

fn record_strategy() -> impl Strategy<Value = MetricRecord> {
    (
        prop::option::weighted(0.9, "[a-c]{1,2}"),
        prop::option::of(prop_oneof!["MOBILE", "DESKTOP", "TABLET"]),
        (measure(), measure(), measure(), measure(), measure()),
    )
        .prop_map(|(campaign, device, (cost, impressions, clicks, conversions, value))| {
            MetricRecord {
                campaign_id: campaign,
                device,
                measures: Measures {
                    cost,
                    impressions,
                    clicks,
                    conversions,
                    conversion_value: value,
                },
                ..Default::default()
            }
        })
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * b.abs().max(1.0)
}

proptest! {
    #[test]
    fn safe_divide_never_yields_non_finite(n in -1e12f64..1e12, d in -1e12f64..1e12) {
        prop_assert_eq!(safe_divide(n, 0.0), 0.0);
        prop_assert_eq!(safe_divide(0.0, d), 0.0);
        prop_assert!(safe_divide(n, d).is_finite());
    }

    #[test]
    fn coercion_is_total(raw in ".{0,24}") {
        let value = Value::String(raw);
        for kind in [FieldKind::Integer, FieldKind::Decimal, FieldKind::MicrosCurrency] {
            prop_assert!(coerce(&value, kind).is_finite());
        }
    }

    #[test]
    fn thousands_separators_are_ignored(n in 0u64..10_000_000_000) {
        let plain = n.to_string();
        let grouped = plain
            .as_bytes()
            .rchunks(3)
            .rev()
            .map(|c| std::str::from_utf8(c).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(",");
        prop_assert_eq!(
            coerce(&Value::String(grouped), FieldKind::Integer),
            n as f64
        );
    }

    #[test]
    fn aggregate_sums_equal_record_sums(
        records in prop::collection::vec(record_strategy(), 0..60),
    ) {
        let raw = Measures::sum(records.iter().map(|r| &r.measures));
        for dims in [&[Dim::Campaign][..], &[Dim::Device][..], &[Dim::Campaign, Dim::Device][..]] {
            let agg = Aggregate::by_dims("prop", &records, dims);
            let mut accounted = agg.totals();
            accounted.merge(&agg.excluded_measures());
            prop_assert!(close(accounted.cost, raw.cost));
            prop_assert!(close(accounted.impressions, raw.impressions));
            prop_assert!(close(accounted.clicks, raw.clicks));
            prop_assert!(close(accounted.conversions, raw.conversions));
            prop_assert!(close(accounted.conversion_value, raw.conversion_value));
            let counted: usize = agg.rows().map(|r| r.record_count).sum();
            prop_assert_eq!(counted + agg.excluded_rows(), records.len());
        }
    }

    #[test]
    fn aggregation_is_order_independent(
        records in prop::collection::vec(record_strategy(), 1..40),
    ) {
        let mut reversed = records.clone();
        reversed.reverse();
        let a = Aggregate::by_dims("fwd", &records, &[Dim::Campaign]);
        let b = Aggregate::by_dims("rev", &reversed, &[Dim::Campaign]);
        let keys_a: Vec<_> = a.sorted_by_key().iter().map(|r| r.key.clone()).collect();
        let keys_b: Vec<_> = b.sorted_by_key().iter().map(|r| r.key.clone()).collect();
        prop_assert_eq!(&keys_a, &keys_b);
        for key in &keys_a {
            let (ra, rb) = (a.get(key).unwrap(), b.get(key).unwrap());
            prop_assert!(close(ra.measures.cost, rb.measures.cost));
            prop_assert!(close(ra.measures.conversions, rb.measures.conversions));
        }
    }

    #[test]
    fn weighted_rollup_ignores_zero_cost(
        campaigns in prop::collection::vec((0.0f64..1.0, prop_oneof![Just(0.0), 0.01f64..1000.0]), 1..20),
    ) {
        let records: Vec<MetricRecord> = campaigns
            .iter()
            .enumerate()
            .map(|(i, (share, cost))| MetricRecord {
                campaign_id: Some(format!("c{i}")),
                measures: Measures { cost: *cost, ..Default::default() },
                shares: ShareMetrics {
                    search_impression_share: Some(*share),
                    ..Default::default()
                },
                ..Default::default()
            })
            .collect();
        let agg = Aggregate::by_dims("is", &records, &[Dim::Campaign]);
        let mut sums = campaign_insights::analytics::types::ShareSums::default();
        for row in agg.rows() {
            sums.merge(&row.shares);
        }

        let positive: Vec<(f64, f64)> = campaigns.iter().copied().filter(|(_, c)| *c > 0.0).collect();
        let weight: f64 = positive.iter().map(|(_, c)| c).sum();
        let expected = safe_divide(positive.iter().map(|(s, c)| s * c).sum(), weight);

        prop_assert!(close(weighted_share(campaigns.iter().copied()), expected));
        match sums.impression_share.value() {
            Some(v) => prop_assert!(close(v, expected)),
            None => prop_assert!(positive.is_empty()),
        }
    }

    #[test]
    fn lag_model_shares_are_monotone_and_bounded(
        counts in prop::collection::vec((0usize..20, 0.0f64..500.0), 0..40),
        max_uplift in 1.0f64..10.0,
        age in 0i64..120,
    ) {
        let today = date(2025, 6, 30);
        let in_window = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        let buckets = default_lag_buckets();
        let records: Vec<MetricRecord> = counts
            .iter()
            .map(|(idx, conversions)| MetricRecord {
                date: Some(in_window),
                lag_bucket: Some(buckets[*idx % buckets.len()].name.clone()),
                measures: Measures { conversions: *conversions, ..Default::default() },
                ..Default::default()
            })
            .collect();
        let model = LagModel::build(&records, &LagConfig::default(), today);

        for row in &model.rows {
            prop_assert!((0.0..=1.0).contains(&row.cumulative_share));
            prop_assert!(row.uplift_factor >= 1.0);
        }
        for pair in model.rows.windows(2) {
            prop_assert!(pair[1].cumulative_share >= pair[0].cumulative_share);
            // A zero cumulative share maps to the neutral factor 1.
            if pair[0].cumulative_share > 0.0 {
                prop_assert!(pair[1].uplift_factor <= pair[0].uplift_factor);
            }
        }

        let applied = uplift_for_lag(&model, age, max_uplift);
        prop_assert!(applied.applied_uplift <= max_uplift);
        prop_assert!(applied.applied_uplift >= 1.0);
    }

    #[test]
    fn pacing_classification_matches_thresholds(
        budget in 0.0f64..1000.0,
        cost in 0.0f64..50_000.0,
        days in 0u32..31,
    ) {
        let config = PacingConfig::default();
        let e = evaluate_pace(Some(budget), cost, days, &config);
        match e.status {
            PacingStatus::Over => prop_assert!(e.pace_ratio > config.high_threshold),
            PacingStatus::Under => {
                prop_assert!(e.pace_ratio < config.low_threshold && e.pace_ratio > 0.0)
            }
            PacingStatus::OnTrack => prop_assert!(
                e.pace_ratio >= config.low_threshold && e.pace_ratio <= config.high_threshold
            ),
            PacingStatus::NotApplicable => prop_assert!(cost == 0.0 || e.pace_ratio == 0.0),
            PacingStatus::NoBudget => prop_assert!(budget <= 0.0 && cost > 0.0),
        }
    }
}

#[test]
fn forecast_window_ages_match_calendar_days() {
    let today = date(2025, 3, 2);
    for age in 0..7u64 {
        let day = today.checked_sub_days(Days::new(age)).unwrap();
        assert_eq!(
            campaign_insights::analytics::bucketing::days_ago(today, day),
            age as i64
        );
    }
}
