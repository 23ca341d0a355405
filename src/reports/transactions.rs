//! Compositions shared by the transaction-level reports (quotes, sales
//! orders, opportunities): one row per transaction, a creation date, a rep,
//! a customer and an amount.

use super::{key_text, labels, with_month};
use crate::aggregate::{group_and_reduce, AggColumn, Reducers};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::rank::{dense_rank_by, top_n, SortKey};
use crate::ratio::share;
use crate::util::{money, ratio};
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::Serialize;

/// Column names of a transaction dataset.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TransactionFields<'a> {
    pub date: &'a str,
    pub id: &'a str,
    pub rep: &'a str,
    pub customer: &'a str,
    pub status: &'a str,
    pub amount: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneralTotal {
    pub total_amount: f64,
    pub total_transactions: u64,
    pub total_customers: u64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodRow {
    pub period: Option<String>,
    pub total_amount: f64,
    pub total_transactions: u64,
    pub total_customers: u64,
    pub avg_ticket: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomersByPeriod {
    pub period: Option<String>,
    pub customers: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerSummary {
    pub total_unique_customers: u64,
    pub customers_by_period: Vec<CustomersByPeriod>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineRow {
    pub date: Option<NaiveDate>,
    pub total_amount: f64,
    pub total_transactions: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneralSummary {
    pub general_total: GeneralTotal,
    pub period_summary: Vec<PeriodRow>,
    pub customer_summary: CustomerSummary,
    pub timeline_general: Vec<TimelineRow>,
}

/// Totals, monthly summary, customers per month and a daily timeline.
pub(crate) fn general_summary(dataset: &Dataset, f: &TransactionFields) -> Result<GeneralSummary> {
    let id = dataset.field(f.id)?;
    let customer = dataset.field(f.customer)?;
    let amount = dataset.field(f.amount)?;
    let bounds = dataset.date_bounds(dataset.field(f.date)?);

    let general_total = GeneralTotal {
        total_amount: money(dataset.total(amount)),
        total_transactions: dataset.count_distinct(id) as u64,
        total_customers: dataset.count_distinct(customer) as u64,
        start_date: bounds.map(|b| b.0),
        end_date: bounds.map(|b| b.1),
    };

    let monthly = with_month(dataset, f.date, "period")?;
    let by_period = group_and_reduce(
        &monthly,
        &["period"],
        &Reducers::new()
            .sum("total_amount", f.amount)
            .count_distinct("total_transactions", f.id)
            .count_distinct("total_customers", f.customer),
    )?
    .sorted_by(&[SortKey::asc("period")])?;
    let total = by_period.column("total_amount")?;
    let txns = by_period.column("total_transactions")?;
    let customers = by_period.column("total_customers")?;
    let period_summary: Vec<PeriodRow> = by_period
        .iter()
        .map(|g| PeriodRow {
            period: key_text(g.get(AggColumn::Key(0))),
            total_amount: money(g.number(total)),
            total_transactions: g.count(txns),
            total_customers: g.count(customers),
            avg_ticket: money(share(g.number(total), g.count(txns) as f64)),
        })
        .collect();
    let customer_summary = CustomerSummary {
        total_unique_customers: general_total.total_customers,
        customers_by_period: period_summary
            .iter()
            .map(|p| CustomersByPeriod {
                period: p.period.clone(),
                customers: p.total_customers,
            })
            .collect(),
    };

    let by_day = group_and_reduce(
        dataset,
        &[f.date],
        &Reducers::new()
            .sum("total_amount", f.amount)
            .count_distinct("total_transactions", f.id),
    )?
    .sorted_by(&[SortKey::asc(f.date)])?;
    let total = by_day.column("total_amount")?;
    let txns = by_day.column("total_transactions")?;
    let timeline_general = by_day
        .iter()
        .map(|g| TimelineRow {
            date: g.get(AggColumn::Key(0)).as_date(),
            total_amount: money(g.number(total)),
            total_transactions: g.count(txns),
        })
        .collect();

    Ok(GeneralSummary {
        general_total,
        period_summary,
        customer_summary,
        timeline_general,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepKpi {
    pub inside_sales: String,
    pub total_amount: f64,
    pub num_transactions: u64,
    pub avg_ticket: f64,
    pub rank_by_amount: u32,
}

/// Amount and transaction count per rep, dense-ranked by amount and listed in
/// rank order.
pub(crate) fn kpi_by_rep(dataset: &Dataset, f: &TransactionFields) -> Result<Vec<RepKpi>> {
    let agg = group_and_reduce(
        dataset,
        &[f.rep],
        &Reducers::new()
            .sum("total_amount", f.amount)
            .count_distinct("num_transactions", f.id),
    )?
    .sorted_by(&[SortKey::asc(f.rep)])?;
    let ranks = dense_rank_by(&agg, "total_amount")?;
    let total = agg.column("total_amount")?;
    let txns = agg.column("num_transactions")?;
    let mut rows: Vec<RepKpi> = agg
        .iter()
        .zip(ranks)
        .map(|(g, rank)| RepKpi {
            inside_sales: g.label(AggColumn::Key(0)),
            total_amount: money(g.number(total)),
            num_transactions: g.count(txns),
            avg_ticket: money(share(g.number(total), g.count(txns) as f64)),
            rank_by_amount: rank,
        })
        .collect();
    rows.sort_by_key(|r| r.rank_by_amount);
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEntry {
    pub num_transactions: u64,
    pub total_amount: f64,
    pub transactions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusByRep {
    pub inside_sales: String,
    pub status_summary: IndexMap<String, StatusEntry>,
}

/// Per rep, per status: distinct transactions, amount and the transaction ids.
pub(crate) fn status_by_rep(dataset: &Dataset, f: &TransactionFields) -> Result<Vec<StatusByRep>> {
    let agg = group_and_reduce(
        dataset,
        &[f.rep, f.status],
        &Reducers::new()
            .count_distinct("num_transactions", f.id)
            .sum("total_amount", f.amount)
            .collect_list("transactions", f.id),
    )?
    .sorted_by(&[SortKey::asc(f.rep), SortKey::asc(f.status)])?;
    let count = agg.column("num_transactions")?;
    let total = agg.column("total_amount")?;
    let ids = agg.column("transactions")?;

    let mut by_rep: IndexMap<String, IndexMap<String, StatusEntry>> = IndexMap::new();
    for g in agg.iter() {
        by_rep.entry(g.label(AggColumn::Key(0))).or_default().insert(
            g.label(AggColumn::Key(1)),
            StatusEntry {
                num_transactions: g.count(count),
                total_amount: money(g.number(total)),
                transactions: labels(g.get(ids).as_list()),
            },
        );
    }
    Ok(by_rep
        .into_iter()
        .map(|(inside_sales, status_summary)| StatusByRep {
            inside_sales,
            status_summary,
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerAmount {
    pub customer: String,
    pub num_transactions: u64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepTopCustomers {
    pub inside_sales: String,
    pub top_total_amount: f64,
    pub top_customers: Vec<CustomerAmount>,
}

/// The `per_rep` largest customers of each rep, keeping the `reps` reps whose
/// top customers add up to the most.
pub(crate) fn top_customers_by_rep(
    dataset: &Dataset,
    f: &TransactionFields,
    per_rep: usize,
    reps: usize,
) -> Result<Vec<RepTopCustomers>> {
    let agg = group_and_reduce(
        dataset,
        &[f.rep, f.customer],
        &Reducers::new()
            .count_distinct("num_transactions", f.id)
            .sum("amount", f.amount),
    )?
    .sorted_by(&[SortKey::asc(f.rep), SortKey::desc("amount"), SortKey::asc(f.customer)])?;
    let count = agg.column("num_transactions")?;
    let amount = agg.column("amount")?;

    let mut by_rep: IndexMap<String, (f64, Vec<CustomerAmount>)> = IndexMap::new();
    for g in agg.iter() {
        let entry = by_rep.entry(g.label(AggColumn::Key(0))).or_default();
        if entry.1.len() < per_rep {
            entry.0 += g.number(amount);
            entry.1.push(CustomerAmount {
                customer: g.label(AggColumn::Key(1)),
                num_transactions: g.count(count),
                amount: money(g.number(amount)),
            });
        }
    }

    let mut rows: Vec<(f64, RepTopCustomers)> = by_rep
        .into_iter()
        .map(|(inside_sales, (total, top_customers))| {
            let row = RepTopCustomers {
                inside_sales,
                top_total_amount: money(total),
                top_customers,
            };
            (total, row)
        })
        .collect();
    rows.sort_by(|a, b| b.0.total_cmp(&a.0));
    rows.truncate(reps);
    Ok(rows.into_iter().map(|(_, row)| row).collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCustomer {
    pub customer: String,
    pub total_amount: f64,
    pub share: f64,
}

/// Largest customers overall with their share of the total amount.
pub(crate) fn top_customers(dataset: &Dataset, f: &TransactionFields, n: usize) -> Result<Vec<RankedCustomer>> {
    let agg = group_and_reduce(dataset, &[f.customer], &Reducers::new().sum("total_amount", f.amount))?;
    let grand_total = agg.total("total_amount")?;
    let top = top_n(agg, &SortKey::desc("total_amount"), n, &[SortKey::asc(f.customer)])?;
    let total = top.column("total_amount")?;
    Ok(top
        .iter()
        .map(|g| RankedCustomer {
            customer: g.label(AggColumn::Key(0)),
            total_amount: money(g.number(total)),
            share: ratio(share(g.number(total), grand_total)),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::types::{FieldKind, FieldSpec, RawDataset, Schema};
    use serde_json::json;

    const FIELDS: &[FieldSpec] = &[
        FieldSpec::required("create_date", FieldKind::Date),
        FieldSpec::required("status", FieldKind::NullableText),
        FieldSpec::required("inside_sales", FieldKind::NullableText),
        FieldSpec::required("so", FieldKind::Text),
        FieldSpec::required("customer", FieldKind::Text),
        FieldSpec::required("amount", FieldKind::Money),
    ];
    const SCHEMA: Schema = Schema {
        name: "orders",
        fields: FIELDS,
    };
    const F: TransactionFields<'static> = TransactionFields {
        date: "create_date",
        id: "so",
        rep: "inside_sales",
        customer: "customer",
        status: "status",
        amount: "amount",
    };

    fn dataset() -> Dataset {
        let rows = vec![
            vec![json!("2025-10-30"), json!("Billed"), json!("Ana"), json!("SO1"), json!("Acme"), json!(100.0)],
            vec![json!("2025-11-02"), json!("Open"), json!("Ana"), json!("SO2"), json!("Beta"), json!(40.0)],
            vec![json!("2025-11-02"), json!("Open"), json!("Luis"), json!("SO3"), json!("Acme"), json!(300.0)],
            vec![json!("2025-11-03"), json!("Billed"), json!("Ana"), json!("SO4"), json!("Acme"), json!(60.0)],
        ];
        let columns = FIELDS.iter().map(|f| f.name.to_string()).collect();
        normalize(&RawDataset::new(columns, rows), &SCHEMA).unwrap().0
    }

    #[test]
    fn general_summary_splits_by_month_and_day() {
        let summary = general_summary(&dataset(), &F).unwrap();
        assert_eq!(summary.general_total.total_amount, 500.0);
        assert_eq!(summary.general_total.total_transactions, 4);
        assert_eq!(summary.general_total.total_customers, 2);
        let periods: Vec<_> = summary
            .period_summary
            .iter()
            .map(|p| p.period.clone().unwrap())
            .collect();
        assert_eq!(periods, vec!["2025-10", "2025-11"]);
        assert_eq!(summary.period_summary[1].avg_ticket, money(400.0 / 3.0));
        assert_eq!(summary.timeline_general.len(), 3);
        assert_eq!(summary.timeline_general[1].total_transactions, 2);
    }

    #[test]
    fn reps_are_listed_by_dense_rank() {
        let kpis = kpi_by_rep(&dataset(), &F).unwrap();
        assert_eq!(kpis[0].inside_sales, "Luis");
        assert_eq!(kpis[0].rank_by_amount, 1);
        assert_eq!(kpis[1].inside_sales, "Ana");
        assert_eq!(kpis[1].num_transactions, 3);
    }

    #[test]
    fn status_lists_keep_transaction_ids() {
        let by_rep = status_by_rep(&dataset(), &F).unwrap();
        assert_eq!(by_rep[0].inside_sales, "Ana");
        let billed = &by_rep[0].status_summary["Billed"];
        assert_eq!(billed.transactions, vec!["SO1", "SO4"]);
        assert_eq!(billed.total_amount, 160.0);
    }

    #[test]
    fn top_customers_per_rep_are_capped() {
        let top = top_customers_by_rep(&dataset(), &F, 1, 1).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].inside_sales, "Luis");
        assert_eq!(top[0].top_customers[0].customer, "Acme");
    }
}
