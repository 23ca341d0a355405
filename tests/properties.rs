//! Property-based tests for the aggregation primitives.
//!
//! Amounts are whole numbers so that every sum is exact in `f64` and totals
//! can be compared with `==`.

use chrono::{Duration, NaiveDate};
use kpi_report::aggregate::{group_and_reduce, AggColumn, Reducers};
use kpi_report::bucket::STANDARD_MARGIN_TIERS;
use kpi_report::granularity::{low_activity, LowActivityThresholds};
use kpi_report::rank::{dense_rank, top_n, SortKey};
use kpi_report::ratio::weighted_ratio_by;
use kpi_report::scorecard::{score, EntityKpis, ScoreWeights};
use kpi_report::types::{DateRange, FieldKind, FieldSpec, RawDataset, Schema};
use kpi_report::{normalize, Dataset};
use proptest::prelude::*;
use serde_json::json;

const FIELDS: &[FieldSpec] = &[
    FieldSpec::required("customer", FieldKind::NullableText),
    FieldSpec::required("day", FieldKind::Date),
    FieldSpec::required("gross_usd", FieldKind::Money),
    FieldSpec::required("gross_margin", FieldKind::Money),
];

const ORDERS: Schema = Schema {
    name: "orders",
    fields: FIELDS,
};

fn base_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
}

/// (customer index, day offset, gross, margin); customer 0 is null.
fn rows() -> impl Strategy<Value = Vec<(u8, i64, i64, i64)>> {
    prop::collection::vec((0u8..5, 0i64..120, -50_000i64..500_000, -20_000i64..200_000), 0..60)
}

fn dataset(rows: &[(u8, i64, i64, i64)]) -> Dataset {
    let raw = RawDataset::new(
        FIELDS.iter().map(|f| f.name.to_string()).collect(),
        rows.iter()
            .map(|(c, day, gross, margin)| {
                let customer = if *c == 0 { json!(null) } else { json!(format!("C{c}")) };
                let day = (base_day() + Duration::days(*day)).to_string();
                vec![customer, json!(day), json!(*gross), json!(*margin)]
            })
            .collect(),
    );
    normalize(&raw, &ORDERS).unwrap().0
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn grouped_sums_add_back_to_the_total(rows in rows()) {
        let ds = dataset(&rows);
        let agg = group_and_reduce(&ds, &["customer"], &Reducers::new().sum("gross", "gross_usd").count("n")).unwrap();
        let gross = agg.column("gross").unwrap();
        let grouped: f64 = agg.iter().map(|g| g.number(gross)).sum();
        let expected: i64 = rows.iter().map(|r| r.2).sum();
        prop_assert_eq!(grouped, expected as f64);
        let members: u64 = agg.iter().map(|g| g.count(agg.column("n").unwrap())).sum();
        prop_assert_eq!(members as usize, ds.len());
    }

    #[test]
    fn weighted_ratio_is_a_ratio_of_sums(rows in rows()) {
        let ds = dataset(&rows);
        let agg = weighted_ratio_by(&ds, &["customer"], "gross_margin", "gross_usd").unwrap();
        let ratio = agg.column("ratio").unwrap();
        for g in agg.iter() {
            let key = g.get(AggColumn::Key(0)).label();
            let members: Vec<_> = rows
                .iter()
                .filter(|r| (r.0 == 0 && key == "None") || key == format!("C{}", r.0))
                .collect();
            let gross: i64 = members.iter().map(|r| r.2).sum();
            let margin: i64 = members.iter().map(|r| r.3).sum();
            let expected = if gross == 0 { 0.0 } else { margin as f64 / gross as f64 };
            prop_assert_eq!(g.number(ratio), expected);
        }
    }

    #[test]
    fn bucketing_is_idempotent(ratios in prop::collection::vec(-5.0f64..5.0, 0..40)) {
        let first: Vec<String> = ratios
            .iter()
            .map(|r| STANDARD_MARGIN_TIERS.assign(*r).unwrap().to_string())
            .collect();
        let second: Vec<String> = ratios
            .iter()
            .map(|r| STANDARD_MARGIN_TIERS.assign(*r).unwrap().to_string())
            .collect();
        prop_assert_eq!(&first, &second);
        for (r, label) in ratios.iter().zip(&first) {
            let interval = STANDARD_MARGIN_TIERS
                .intervals()
                .iter()
                .find(|i| &i.label == label)
                .unwrap();
            prop_assert!(interval.contains(*r));
        }
    }

    #[test]
    fn top_n_is_deterministic_and_ordered(rows in rows(), n in 0usize..8) {
        let ds = dataset(&rows);
        let run = || {
            let agg = group_and_reduce(&ds, &["customer"], &Reducers::new().sum("gross", "gross_usd")).unwrap();
            top_n(agg, &SortKey::desc("gross"), n, &[SortKey::asc("customer")]).unwrap()
        };
        let (a, b) = (run(), run());
        prop_assert_eq!(&a, &b);
        prop_assert!(a.len() <= n);
        let gross = a.column("gross").unwrap();
        let amounts: Vec<f64> = a.iter().map(|g| g.number(gross)).collect();
        prop_assert!(amounts.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn dense_ranks_have_no_gaps(values in prop::collection::vec(0i64..20, 1..30)) {
        let values: Vec<f64> = values.into_iter().map(|v| v as f64).collect();
        let ranks = dense_rank(&values);
        let mut distinct = values.clone();
        distinct.sort_by(|a, b| a.total_cmp(b));
        distinct.dedup();
        prop_assert_eq!(ranks.iter().copied().max(), Some(distinct.len() as u32));
        for (i, a) in values.iter().enumerate() {
            for (j, b) in values.iter().enumerate() {
                if a > b {
                    prop_assert!(ranks[i] < ranks[j]);
                }
            }
        }
    }

    #[test]
    fn only_one_resolution_is_ever_populated(
        rows in rows(),
        start in 0i64..120,
        len in 0i64..60,
        today in 0i64..200,
    ) {
        let ds = dataset(&rows);
        let range = DateRange::new(
            base_day() + Duration::days(start),
            base_day() + Duration::days(start + len),
        )
        .unwrap();
        let low = low_activity(
            &ds,
            "customer",
            "day",
            range,
            base_day() + Duration::days(today),
            &LowActivityThresholds::default(),
        )
        .unwrap();
        let populated = [&low.daily, &low.weekly, &low.monthly]
            .iter()
            .filter(|v| !v.is_empty())
            .count();
        prop_assert!(populated <= 1);
    }

    #[test]
    fn scores_stay_within_bounds(
        kpis in prop::collection::vec(
            (prop::option::of(0.0f64..1.0), prop::option::of(0.0f64..1.0), prop::option::of(0.0f64..30.0)),
            0..12,
        )
    ) {
        let entities: Vec<EntityKpis> = kpis
            .iter()
            .enumerate()
            .map(|(i, (v, a, r))| EntityKpis { entity: format!("rep{i}"), values: vec![*v, *a, *r] })
            .collect();
        let scored = score(&entities, &ScoreWeights::default().kpis()).unwrap();
        prop_assert_eq!(scored.len(), entities.len());
        prop_assert!(scored.iter().all(|s| (0.0..=100.0).contains(&s.score)));
        prop_assert!(scored.windows(2).all(|w| w[0].score >= w[1].score));
    }
}
