// Order history of a customer: totals, monthly timeline, status mix and the
// orders worth a second look.

use super::{key_text, labels, with_month, Report, ReportContext, ReportKind};
use crate::aggregate::{group_and_reduce, AggColumn, Reducers};
use crate::dataset::{Dataset, Field, Record};
use crate::error::Result;
use crate::rank::{compare_values, top_n_by, Direction, SortKey};
use crate::ratio::share;
use crate::types::{FieldKind, FieldSpec, Schema};
use crate::util::{money, opt_ratio, ratio};
use chrono::NaiveDate;
use serde::Serialize;

const FIELDS: &[FieldSpec] = &[
    FieldSpec::required("tranid", FieldKind::Text),
    FieldSpec::required("date", FieldKind::Date),
    FieldSpec::optional("period", FieldKind::NullableText),
    FieldSpec::required("status", FieldKind::NullableText),
    FieldSpec::required("gross_usd", FieldKind::Money),
    FieldSpec::required("net_usd", FieldKind::Money),
    FieldSpec::required("gross_margin", FieldKind::Money),
    FieldSpec::optional("gross_margin_pct", FieldKind::Ratio),
];

pub const SCHEMA: Schema = Schema {
    name: "customer_orders",
    fields: FIELDS,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrdersTotals {
    pub gross_usd_total: f64,
    pub net_usd_total: f64,
    pub gross_margin_total: f64,
    pub gross_margin_pct_weighted: f64,
    pub num_transactions: u64,
    pub avg_ticket: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineRow {
    pub period: Option<String>,
    pub gross_usd_sum: f64,
    pub gross_margin_sum: f64,
    pub num_orders: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusRow {
    pub status: Option<String>,
    pub num_orders: u64,
    pub gross_usd_sum: f64,
    pub tranids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRow {
    pub tranid: String,
    pub date: Option<NaiveDate>,
    pub status: Option<String>,
    pub gross_usd: f64,
    pub gross_margin: f64,
    pub gross_margin_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outliers {
    pub top_orders: Vec<OrderRow>,
    pub negative_margin_orders: Vec<OrderRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerOrdersSummary {
    pub general_summary: OrdersTotals,
    pub timeline_summary: Vec<TimelineRow>,
    pub status_summary: Vec<StatusRow>,
    pub outliers_summary: Outliers,
    pub full_data_reference: Option<String>,
}

struct OrderFields {
    tranid: Field,
    date: Field,
    status: Field,
    gross: Field,
    margin: Field,
    pct: Field,
}

impl OrderFields {
    fn resolve(dataset: &Dataset) -> Result<Self> {
        Ok(OrderFields {
            tranid: dataset.field("tranid")?,
            date: dataset.field("date")?,
            status: dataset.field("status")?,
            gross: dataset.field("gross_usd")?,
            margin: dataset.field("gross_margin")?,
            pct: dataset.field("gross_margin_pct")?,
        })
    }

    fn row(&self, r: &Record) -> OrderRow {
        OrderRow {
            tranid: r.get(self.tranid).label(),
            date: r.date(self.date),
            status: r.text(self.status).map(str::to_string),
            gross_usd: money(r.amount(self.gross)),
            gross_margin: money(r.amount(self.margin)),
            gross_margin_pct: opt_ratio(r.number(self.pct)),
        }
    }
}

fn totals(dataset: &Dataset) -> Result<OrdersTotals> {
    let gross = dataset.total(dataset.field("gross_usd")?);
    let margin = dataset.total(dataset.field("gross_margin")?);
    Ok(OrdersTotals {
        gross_usd_total: money(gross),
        net_usd_total: money(dataset.total(dataset.field("net_usd")?)),
        gross_margin_total: money(margin),
        gross_margin_pct_weighted: ratio(share(margin, gross)),
        num_transactions: dataset.len() as u64,
        avg_ticket: money(dataset.mean(dataset.field("gross_usd")?).unwrap_or(0.0)),
    })
}

fn timeline(dataset: &Dataset) -> Result<Vec<TimelineRow>> {
    let dataset = if dataset.has_field("period") {
        dataset.clone()
    } else {
        with_month(dataset, "date", "period")?
    };
    let agg = group_and_reduce(
        &dataset,
        &["period"],
        &Reducers::new()
            .sum("gross_usd_sum", "gross_usd")
            .sum("gross_margin_sum", "gross_margin")
            .count("num_orders"),
    )?
    .sorted_by(&[SortKey::asc("period")])?;
    let (gross, margin, orders) = (
        agg.column("gross_usd_sum")?,
        agg.column("gross_margin_sum")?,
        agg.column("num_orders")?,
    );
    Ok(agg
        .iter()
        .map(|g| TimelineRow {
            period: key_text(g.get(AggColumn::Key(0))),
            gross_usd_sum: money(g.number(gross)),
            gross_margin_sum: money(g.number(margin)),
            num_orders: g.count(orders),
        })
        .collect())
}

fn status_summary(dataset: &Dataset) -> Result<Vec<StatusRow>> {
    let agg = group_and_reduce(
        dataset,
        &["status"],
        &Reducers::new()
            .count("num_orders")
            .sum("gross_usd_sum", "gross_usd")
            .collect_list("tranids", "tranid"),
    )?
    .sorted_by(&[SortKey::asc("status")])?;
    let (orders, gross, ids) = (
        agg.column("num_orders")?,
        agg.column("gross_usd_sum")?,
        agg.column("tranids")?,
    );
    Ok(agg
        .iter()
        .map(|g| StatusRow {
            status: key_text(g.get(AggColumn::Key(0))),
            num_orders: g.count(orders),
            gross_usd_sum: money(g.number(gross)),
            tranids: labels(g.get(ids).as_list()),
        })
        .collect())
}

fn outliers(dataset: &Dataset, top: usize) -> Result<Outliers> {
    let f = OrderFields::resolve(dataset)?;
    let by_gross = top_n_by(dataset.records().iter().collect(), top, |a: &&Record, b: &&Record| {
        compare_values(a.get(f.gross), b.get(f.gross), Direction::Descending)
    });
    Ok(Outliers {
        top_orders: by_gross.into_iter().map(|r| f.row(r)).collect(),
        negative_margin_orders: dataset
            .records()
            .iter()
            .filter(|r| r.amount(f.margin) < 0.0)
            .map(|r| f.row(r))
            .collect(),
    })
}

pub struct CustomerOrdersReport;

impl Report for CustomerOrdersReport {
    type Output = CustomerOrdersSummary;

    const KIND: ReportKind = ReportKind::CustomerOrders;

    fn build(dataset: &Dataset, ctx: &ReportContext) -> Result<CustomerOrdersSummary> {
        Ok(CustomerOrdersSummary {
            general_summary: totals(dataset)?,
            timeline_summary: timeline(dataset)?,
            status_summary: status_summary(dataset)?,
            outliers_summary: outliers(dataset, ctx.config.limits.top_orders)?,
            full_data_reference: ctx.full_data_reference.clone(),
        })
    }
}
