// Quote to sales order performance of each inside sales rep.
//
// One row per quote line and linked sales order. A quote converted when any
// of its rows carries a sales order number. Response time is the number of
// days from the customer's request to the quote, averaged per quote and then
// per rep.

use super::{Report, ReportContext, ReportKind};
use crate::aggregate::{group_and_reduce, AggColumn, Reducers};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::rank::{compare_values, dense_rank, Direction};
use crate::ratio::{funnel, funnel_by, FunnelRates, FunnelSpec};
use crate::scorecard::{score, EntityKpis, ScoreWeights, ScoredEntity};
use crate::types::{FieldKind, FieldSpec, Schema, Value};
use crate::util::{days_diff, money, opt_money, opt_ratio, ratio};
use indexmap::IndexMap;
use serde::Serialize;

const FIELDS: &[FieldSpec] = &[
    FieldSpec::required("inside_sales", FieldKind::NullableText),
    FieldSpec::required("quote_number", FieldKind::NullableText),
    FieldSpec::required("quote_date", FieldKind::Date),
    FieldSpec::required("quote_amount", FieldKind::Money),
    FieldSpec::optional("request_date", FieldKind::Date),
    FieldSpec::required("so_number", FieldKind::NullableText),
    FieldSpec::required("so_amount", FieldKind::Money),
    FieldSpec::optional("customer", FieldKind::NullableText),
];

pub const SCHEMA: Schema = Schema {
    name: "performance",
    fields: FIELDS,
};

const QUOTE_TO_ORDER: FunnelSpec<'static> = FunnelSpec {
    entity: "quote_number",
    link: "so_number",
    source_amount: "quote_amount",
    target_amount: "so_amount",
};

const RESPONSE_DAYS: &str = "response_days";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelTotals {
    pub total_quotes: u64,
    pub converted_quotes: u64,
    pub hitrate_volume: f64,
    pub quoted_amount: f64,
    pub converted_amount: f64,
    pub hitrate_amount: Option<f64>,
    pub avg_response_days: Option<f64>,
    pub num_inside_sales: u64,
    pub num_customers: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepFunnel {
    pub inside_sales: String,
    pub total_quotes: u64,
    pub converted_quotes: u64,
    pub hitrate_volume: f64,
    pub quoted_amount: f64,
    pub converted_amount: f64,
    pub hitrate_amount: Option<f64>,
    pub avg_response_days: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRow {
    pub inside_sales: String,
    pub rank: u32,
    pub score: f64,
    pub normalized: IndexMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub general_summary: FunnelTotals,
    pub by_inside: Vec<RepFunnel>,
    pub scorecard: Vec<ScoreRow>,
    pub weights: ScoreWeights,
    pub full_data_reference: Option<String>,
}

/// Days from request to quote; unknown or negative spans are not observed.
fn with_response_days(dataset: &Dataset) -> Result<Dataset> {
    let requested = dataset.field("request_date")?;
    let quoted = dataset.field("quote_date")?;
    Ok(dataset.derive(RESPONSE_DAYS, FieldKind::Measure, |r| {
        match (r.date(requested), r.date(quoted)) {
            (Some(from), Some(to)) if to >= from => Value::Number(days_diff(from, to)),
            _ => Value::Null,
        }
    }))
}

/// Mean response days per rep, each quote weighted once however many rows it
/// spans.
fn response_by_rep(dataset: &Dataset) -> Result<IndexMap<Value, f64>> {
    let per_quote = group_and_reduce(
        dataset,
        &["inside_sales", "quote_number"],
        &Reducers::new().mean(RESPONSE_DAYS, RESPONSE_DAYS),
    )?;
    let days = per_quote.column(RESPONSE_DAYS)?;
    let mut acc: IndexMap<Value, (f64, usize)> = IndexMap::new();
    for g in per_quote.iter() {
        if g.get(AggColumn::Key(1)).is_null() {
            continue;
        }
        if let Some(d) = g.opt_number(days) {
            let entry = acc.entry(g.get(AggColumn::Key(0)).clone()).or_default();
            entry.0 += d;
            entry.1 += 1;
        }
    }
    Ok(acc
        .into_iter()
        .map(|(rep, (total, n))| (rep, total / n as f64))
        .collect())
}

fn overall_response(dataset: &Dataset) -> Result<Option<f64>> {
    let per_quote = group_and_reduce(
        dataset,
        &["quote_number"],
        &Reducers::new().mean(RESPONSE_DAYS, RESPONSE_DAYS),
    )?;
    let days = per_quote.column(RESPONSE_DAYS)?;
    let observed: Vec<f64> = per_quote
        .iter()
        .filter(|g| !g.get(AggColumn::Key(0)).is_null())
        .filter_map(|g| g.opt_number(days))
        .collect();
    if observed.is_empty() {
        return Ok(None);
    }
    Ok(Some(observed.iter().sum::<f64>() / observed.len() as f64))
}

fn rep_row(rep: &Value, rates: &FunnelRates, response: Option<f64>) -> RepFunnel {
    RepFunnel {
        inside_sales: rep.label(),
        total_quotes: rates.total as u64,
        converted_quotes: rates.converted as u64,
        hitrate_volume: ratio(rates.hitrate_volume),
        quoted_amount: money(rates.source_amount.unwrap_or(0.0)),
        converted_amount: money(rates.converted_amount.unwrap_or(0.0)),
        hitrate_amount: opt_ratio(rates.hitrate_amount),
        avg_response_days: opt_money(response),
    }
}

/// Rounded scorecard rows, dense-ranked on the score as displayed.
fn score_rows(scored: Vec<ScoredEntity>) -> Vec<ScoreRow> {
    let mut rows: Vec<ScoreRow> = scored
        .into_iter()
        .map(|s| ScoreRow {
            inside_sales: s.entity,
            rank: 0,
            score: ratio(s.score),
            normalized: s
                .normalized
                .into_iter()
                .map(|(k, v)| (k, ratio(v)))
                .collect(),
        })
        .collect();
    let shown: Vec<f64> = rows.iter().map(|r| r.score).collect();
    for (row, rank) in rows.iter_mut().zip(dense_rank(&shown)) {
        row.rank = rank;
    }
    rows
}

pub struct PerformanceReport;

impl Report for PerformanceReport {
    type Output = PerformanceSummary;

    const KIND: ReportKind = ReportKind::Performance;

    fn build(dataset: &Dataset, ctx: &ReportContext) -> Result<PerformanceSummary> {
        let dataset = with_response_days(dataset)?;
        let weights = ctx.config.scorecard;

        let overall = funnel(&dataset, &QUOTE_TO_ORDER)?;
        let general_summary = FunnelTotals {
            total_quotes: overall.total as u64,
            converted_quotes: overall.converted as u64,
            hitrate_volume: ratio(overall.hitrate_volume),
            quoted_amount: money(overall.source_amount.unwrap_or(0.0)),
            converted_amount: money(overall.converted_amount.unwrap_or(0.0)),
            hitrate_amount: opt_ratio(overall.hitrate_amount),
            avg_response_days: opt_money(overall_response(&dataset)?),
            num_inside_sales: dataset.count_distinct(dataset.field("inside_sales")?) as u64,
            num_customers: dataset.count_distinct(dataset.field("customer")?) as u64,
        };

        let mut per_rep = funnel_by(&dataset, "inside_sales", &QUOTE_TO_ORDER)?;
        per_rep.sort_by(|a, b| compare_values(&a.0, &b.0, Direction::Ascending));
        let response = response_by_rep(&dataset)?;

        let entities: Vec<EntityKpis> = per_rep
            .iter()
            .map(|(rep, rates)| EntityKpis {
                entity: rep.label(),
                values: vec![
                    Some(rates.hitrate_volume),
                    rates.hitrate_amount,
                    response.get(rep).copied(),
                ],
            })
            .collect();
        let scorecard = score_rows(score(&entities, &weights.kpis())?);
        tracing::debug!(reps = per_rep.len(), "scored inside sales reps");

        Ok(PerformanceSummary {
            general_summary,
            by_inside: per_rep
                .iter()
                .map(|(rep, rates)| rep_row(rep, rates, response.get(rep).copied()))
                .collect(),
            scorecard,
            weights,
            full_data_reference: ctx.full_data_reference.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::types::RawDataset;
    use chrono::NaiveDate;
    use serde_json::json;

    fn performance() -> Dataset {
        let columns = vec![
            "inside_sales", "quote_number", "request_date", "quote_date", "quote_amount", "so_number", "so_amount",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        let rows = vec![
            vec![json!("Ana"), json!("Q1"), json!("2025-11-01"), json!("2025-11-03"), json!(100), json!("SO1"), json!(100)],
            vec![json!("Ana"), json!("Q2"), json!("2025-11-01"), json!("2025-11-02"), json!(100), json!(null), json!(0)],
            vec![json!("Luis"), json!("Q3"), json!("2025-11-01"), json!("2025-11-05"), json!(50), json!("SO3"), json!(50)],
        ];
        normalize(&RawDataset::new(columns, rows), &SCHEMA).unwrap().0
    }

    fn build() -> PerformanceSummary {
        let ctx = ReportContext::new(NaiveDate::from_ymd_opt(2025, 11, 18).unwrap());
        PerformanceReport::build(&performance(), &ctx).unwrap()
    }

    #[test]
    fn funnel_per_rep_and_overall() {
        let out = build();
        assert_eq!(out.general_summary.total_quotes, 3);
        assert_eq!(out.general_summary.converted_quotes, 2);
        assert_eq!(out.general_summary.hitrate_amount, Some(0.6));
        let ana = &out.by_inside[0];
        assert_eq!(ana.inside_sales, "Ana");
        assert_eq!(ana.hitrate_volume, 0.5);
        assert_eq!(ana.hitrate_amount, Some(0.5));
        assert_eq!(ana.avg_response_days, Some(1.5));
    }

    #[test]
    fn faster_converting_rep_scores_higher() {
        let out = build();
        assert_eq!(out.scorecard[0].inside_sales, "Luis");
        assert_eq!(out.scorecard[0].score, 75.0);
        assert_eq!(out.scorecard[1].score, 25.0);
        assert_eq!(out.scorecard[1].normalized["response_time"], 1.0);
        assert_eq!(out.scorecard[1].rank, 2);
    }

    #[test]
    fn ranks_follow_the_displayed_score() {
        let entity = |name: &str, rank: u32, score: f64| ScoredEntity {
            entity: name.to_string(),
            rank,
            score,
            normalized: IndexMap::new(),
        };
        let rows = score_rows(vec![
            entity("Ana", 1, 62.500_000_04),
            entity("Luis", 2, 62.500_000_01),
            entity("Marta", 3, 40.0),
        ]);
        let shown: Vec<(&str, u32, f64)> = rows
            .iter()
            .map(|r| (r.inside_sales.as_str(), r.rank, r.score))
            .collect();
        assert_eq!(shown, vec![("Ana", 1, 62.5), ("Luis", 1, 62.5), ("Marta", 2, 40.0)]);
    }
}
