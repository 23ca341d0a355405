// Quotes by inside sales rep.
//
// Besides the shared transaction summaries, quotes carry a win rate per rep
// (a quote is won when its status is the configured won status) and the
// incoterms mix of each rep's quoted amount.

use super::transactions::{
    general_summary, kpi_by_rep, status_by_rep, GeneralSummary, RepKpi, StatusByRep,
    TransactionFields,
};
use super::{Report, ReportContext, ReportKind};
use crate::aggregate::{group_and_reduce, AggColumn, Reducers};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::rank::{compare_values, Direction, SortKey};
use crate::ratio::{funnel_by, share, FunnelSpec};
use crate::types::{FieldKind, FieldSpec, Schema, Value};
use crate::util::{money, opt_ratio, ratio};
use indexmap::IndexMap;
use serde::Serialize;

const FIELDS: &[FieldSpec] = &[
    FieldSpec::required("create_date", FieldKind::Date),
    FieldSpec::required("status", FieldKind::NullableText),
    FieldSpec::required("inside_sales", FieldKind::NullableText),
    FieldSpec::required("quote_number", FieldKind::Text),
    FieldSpec::required("customer", FieldKind::Text),
    FieldSpec::optional("subsidiary", FieldKind::NullableText),
    FieldSpec::optional("incoterms", FieldKind::NullableText),
    FieldSpec::required("amount", FieldKind::Money),
];

pub const SCHEMA: Schema = Schema {
    name: "quotes",
    fields: FIELDS,
};

const COLUMNS: TransactionFields<'static> = TransactionFields {
    date: "create_date",
    id: "quote_number",
    rep: "inside_sales",
    customer: "customer",
    status: "status",
    amount: "amount",
};

const WON_QUOTE: &str = "won_quote";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WinRate {
    pub inside_sales: String,
    pub total_quotes: u64,
    pub won_quotes: u64,
    pub win_rate_quotes: f64,
    pub total_amount: f64,
    pub won_amount: f64,
    /// Null when the rep quoted or won no amount.
    pub win_rate_amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncotermShare {
    pub incoterm: String,
    pub num_quotes: u64,
    pub total_amount: f64,
    pub amount_share_inside: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepIncoterms {
    pub inside_sales: String,
    pub incoterms: Vec<IncotermShare>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotesSummary {
    pub general_summary: GeneralSummary,
    pub kpi_by_inside: Vec<RepKpi>,
    pub status_summary_by_inside: Vec<StatusByRep>,
    pub win_rate_by_inside: Vec<WinRate>,
    pub incoterms_by_inside: Vec<RepIncoterms>,
    pub full_data_reference: Option<String>,
}

fn win_rates(dataset: &Dataset, won_status: &str) -> Result<Vec<WinRate>> {
    let status = dataset.field("status")?;
    let quote = dataset.field("quote_number")?;
    let marked = dataset.derive(WON_QUOTE, FieldKind::NullableText, |r| {
        if r.text(status) == Some(won_status) {
            r.get(quote).clone()
        } else {
            Value::Null
        }
    });
    let spec = FunnelSpec {
        entity: "quote_number",
        link: WON_QUOTE,
        source_amount: "amount",
        target_amount: "amount",
    };
    let mut rates = funnel_by(&marked, "inside_sales", &spec)?;
    rates.sort_by(|a, b| compare_values(&a.0, &b.0, Direction::Ascending));
    Ok(rates
        .into_iter()
        .map(|(rep, r)| WinRate {
            inside_sales: rep.label(),
            total_quotes: r.total as u64,
            won_quotes: r.converted as u64,
            win_rate_quotes: ratio(r.hitrate_volume),
            total_amount: money(r.source_amount.unwrap_or(0.0)),
            won_amount: money(r.converted_amount.unwrap_or(0.0)),
            win_rate_amount: opt_ratio(r.hitrate_amount),
        })
        .collect())
}

fn incoterms_by_rep(dataset: &Dataset) -> Result<Vec<RepIncoterms>> {
    let agg = group_and_reduce(
        dataset,
        &["inside_sales", "incoterms"],
        &Reducers::new()
            .count_distinct("num_quotes", "quote_number")
            .sum("total_amount", "amount"),
    )?
    .sorted_by(&[SortKey::asc("inside_sales"), SortKey::asc("incoterms")])?;
    let count = agg.column("num_quotes")?;
    let total = agg.column("total_amount")?;

    let mut rep_totals: IndexMap<Value, f64> = IndexMap::new();
    for g in agg.iter() {
        *rep_totals.entry(g.get(AggColumn::Key(0)).clone()).or_insert(0.0) += g.number(total);
    }

    let mut by_rep: IndexMap<String, Vec<IncotermShare>> = IndexMap::new();
    for g in agg.iter() {
        let rep_total = rep_totals.get(g.get(AggColumn::Key(0))).copied().unwrap_or(0.0);
        by_rep
            .entry(g.label(AggColumn::Key(0)))
            .or_default()
            .push(IncotermShare {
                incoterm: g.label(AggColumn::Key(1)),
                num_quotes: g.count(count),
                total_amount: money(g.number(total)),
                amount_share_inside: ratio(share(g.number(total), rep_total)),
            });
    }
    Ok(by_rep
        .into_iter()
        .map(|(inside_sales, incoterms)| RepIncoterms {
            inside_sales,
            incoterms,
        })
        .collect())
}

pub struct QuotesReport;

impl Report for QuotesReport {
    type Output = QuotesSummary;

    const KIND: ReportKind = ReportKind::Quotes;

    fn build(dataset: &Dataset, ctx: &ReportContext) -> Result<QuotesSummary> {
        Ok(QuotesSummary {
            general_summary: general_summary(dataset, &COLUMNS)?,
            kpi_by_inside: kpi_by_rep(dataset, &COLUMNS)?,
            status_summary_by_inside: status_by_rep(dataset, &COLUMNS)?,
            win_rate_by_inside: win_rates(dataset, &ctx.config.statuses.won_status)?,
            incoterms_by_inside: incoterms_by_rep(dataset)?,
            full_data_reference: ctx.full_data_reference.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::types::RawDataset;
    use serde_json::json;

    fn quotes() -> Dataset {
        let columns = vec![
            "CreateDate", "Status", "InsideSales", "QuoteNumber", "Customer", "IncoTerms", "Amount",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        let rows = vec![
            vec![json!("2025-11-03"), json!("Closed"), json!("Ana"), json!("Q1"), json!("Acme"), json!("FOB"), json!(300.0)],
            vec![json!("2025-11-03"), json!("Open"), json!("Ana"), json!("Q2"), json!("Acme"), json!("EXW"), json!(100.0)],
            vec![json!("2025-11-04"), json!("Open"), json!("Luis"), json!("Q3"), json!("Beta"), json!(""), json!(0.0)],
        ];
        normalize(&RawDataset::new(columns, rows), &SCHEMA).unwrap().0
    }

    #[test]
    fn win_rate_uses_the_won_status() {
        let rates = win_rates(&quotes(), "Closed").unwrap();
        assert_eq!(rates[0].inside_sales, "Ana");
        assert_eq!(rates[0].won_quotes, 1);
        assert_eq!(rates[0].win_rate_quotes, 0.5);
        assert_eq!(rates[0].win_rate_amount, Some(0.75));
        assert_eq!(rates[1].win_rate_quotes, 0.0);
        assert_eq!(rates[1].win_rate_amount, None);
    }

    #[test]
    fn incoterm_shares_sum_to_one_per_rep() {
        let by_rep = incoterms_by_rep(&quotes()).unwrap();
        let ana: f64 = by_rep[0].incoterms.iter().map(|i| i.amount_share_inside).sum();
        assert_eq!(ana, 1.0);
        assert_eq!(by_rep[1].incoterms[0].incoterm, "None");
        assert_eq!(by_rep[1].incoterms[0].amount_share_inside, 0.0);
    }
}
