// Finance summary over booked sales orders.
//
// Bookings are measured on net amounts; gross margin is reported three ways:
// the plain total, the mean of the per-order margin percentages and the
// weighted margin (total margin over total gross). Customers with positive
// gross are classified into margin tiers by their weighted margin.

use super::{data_sample, money_by_key, period, with_month, Period, Report, ReportContext, ReportKind};
use crate::aggregate::{group_and_reduce, AggColumn, Reducers};
use crate::bucket::{tally, STANDARD_MARGIN_TIERS};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::rank::{top_n, SortKey};
use crate::ratio::{share, weighted_ratio_by};
use crate::types::{FieldKind, FieldSpec, Schema, Value};
use crate::util::{money, ratio};
use indexmap::IndexMap;
use serde::Serialize;

const FIELDS: &[FieldSpec] = &[
    FieldSpec::optional("so_number", FieldKind::NullableText),
    FieldSpec::optional("date", FieldKind::Date),
    FieldSpec::optional("period", FieldKind::NullableText),
    FieldSpec::optional("subsidiary", FieldKind::NullableText),
    FieldSpec::required("customer", FieldKind::Text),
    FieldSpec::optional("customer_country", FieldKind::NullableText),
    FieldSpec::optional("sales_rep", FieldKind::NullableText),
    FieldSpec::required("gross_usd", FieldKind::Money),
    FieldSpec::required("net_usd", FieldKind::Money),
    FieldSpec::optional("terms", FieldKind::NullableText),
    FieldSpec::required("gross_margin", FieldKind::Money),
    FieldSpec::optional("gross_margin_pct", FieldKind::Ratio),
];

pub const SCHEMA: Schema = Schema {
    name: "bookings",
    fields: FIELDS,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bookings {
    pub total_bookings: f64,
    pub order_count: u64,
    pub average_booking: f64,
    pub bookings_by_country: IndexMap<String, f64>,
    pub bookings_by_sales_rep: IndexMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarginBucket {
    pub margin_bucket: String,
    pub num_customers: u64,
    pub gross_usd_sum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrossMargin {
    pub gross_profit_total: f64,
    pub average_gm_pct: f64,
    pub weighted_gm_pct: f64,
    pub margin_buckets: Vec<MarginBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Terms {
    pub distribution_count: IndexMap<String, u64>,
    pub distribution_pct: IndexMap<String, f64>,
    pub bookings_by_terms: IndexMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopClient {
    pub client: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Concentration {
    pub top_n: usize,
    pub top_clients_share_amount: f64,
    pub top_clients_share_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubsidiaryKpi {
    pub period: Option<String>,
    pub subsidiary: Option<String>,
    pub gross_usd: f64,
    pub net_usd: f64,
    pub gross_margin: f64,
    pub gm_pct_prom: f64,
    pub customers: u64,
    pub transactions: u64,
    pub gross_margin_pct_weighted: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinanceSummary {
    pub period: Period,
    pub bookings: Bookings,
    pub gross_margin: GrossMargin,
    pub terms: Terms,
    pub top_clients: Vec<TopClient>,
    pub concentration: Concentration,
    pub kpi_by_subsidiary: Vec<SubsidiaryKpi>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingsSummary {
    pub finance_summary: FinanceSummary,
    pub data_sample: Vec<IndexMap<String, Value>>,
    pub full_data_reference: Option<String>,
}

fn bookings(dataset: &Dataset) -> Result<Bookings> {
    let net = dataset.field("net_usd")?;
    let by = |key: &str| {
        let agg = group_and_reduce(dataset, &[key], &Reducers::new().sum("net_usd", "net_usd"))?
            .sorted_by(&[SortKey::asc(key)])?;
        money_by_key(&agg, "net_usd")
    };
    Ok(Bookings {
        total_bookings: money(dataset.total(net)),
        order_count: dataset.len() as u64,
        average_booking: money(dataset.mean(net).unwrap_or(0.0)),
        bookings_by_country: by("customer_country")?,
        bookings_by_sales_rep: by("sales_rep")?,
    })
}

/// Weighted margin tiers of the customers with positive gross.
pub(crate) fn margin_buckets(dataset: &Dataset) -> Result<Vec<MarginBucket>> {
    let gross = dataset.field("gross_usd")?;
    let positive = dataset.filter(|r| r.amount(gross) > 0.0);
    let customers = weighted_ratio_by(&positive, &["customer"], "gross_margin", "gross_usd")?;
    let pct = customers.column("ratio")?;
    let gross = customers.column("gross_usd")?;
    let tallies = tally(
        &STANDARD_MARGIN_TIERS,
        customers.iter().map(|g| (g.number(pct), g.number(gross))),
    )?;
    Ok(tallies
        .into_iter()
        .map(|t| MarginBucket {
            margin_bucket: t.label,
            num_customers: t.count as u64,
            gross_usd_sum: money(t.amount),
        })
        .collect())
}

fn gross_margin(dataset: &Dataset) -> Result<GrossMargin> {
    let margin = dataset.field("gross_margin")?;
    let gross = dataset.field("gross_usd")?;
    let pct = dataset.field("gross_margin_pct")?;
    Ok(GrossMargin {
        gross_profit_total: money(dataset.total(margin)),
        average_gm_pct: ratio(dataset.mean(pct).unwrap_or(0.0)),
        weighted_gm_pct: ratio(share(dataset.total(margin), dataset.total(gross))),
        margin_buckets: margin_buckets(dataset)?,
    })
}

fn terms(dataset: &Dataset) -> Result<Terms> {
    let agg = group_and_reduce(
        dataset,
        &["terms"],
        &Reducers::new().count("count").sum("net_usd", "net_usd"),
    )?
    .sorted_by(&[SortKey::desc("count")])?;
    let count = agg.column("count")?;
    let orders = dataset.len() as f64;
    Ok(Terms {
        distribution_count: super::count_by_key(&agg, "count")?,
        distribution_pct: agg
            .iter()
            .map(|g| (g.label(AggColumn::Key(0)), ratio(share(g.number(count), orders))))
            .collect(),
        bookings_by_terms: money_by_key(&agg, "net_usd")?,
    })
}

fn top_clients(dataset: &Dataset, n: usize) -> Result<(Vec<TopClient>, Concentration)> {
    let agg = group_and_reduce(dataset, &["customer"], &Reducers::new().sum("net_usd", "net_usd"))?;
    let total = agg.total("net_usd")?;
    let top = top_n(agg, &SortKey::desc("net_usd"), n, &[SortKey::asc("customer")])?;
    let top_amount = top.total("net_usd")?;
    let clients = money_by_key(&top, "net_usd")?
        .into_iter()
        .map(|(client, amount)| TopClient { client, amount })
        .collect();
    let concentration = Concentration {
        top_n: n,
        top_clients_share_amount: money(top_amount),
        top_clients_share_pct: ratio(if total > 0.0 { share(top_amount, total) } else { 0.0 }),
    };
    Ok((clients, concentration))
}

fn kpi_by_subsidiary(dataset: &Dataset) -> Result<Vec<SubsidiaryKpi>> {
    if !dataset.has_field("subsidiary") {
        return Ok(Vec::new());
    }
    let dataset = if dataset.has_field("period") {
        dataset.clone()
    } else {
        with_month(dataset, "date", "period")?
    };
    let agg = group_and_reduce(
        &dataset,
        &["period", "subsidiary"],
        &Reducers::new()
            .sum("gross_usd", "gross_usd")
            .sum("net_usd", "net_usd")
            .sum("gross_margin", "gross_margin")
            .mean("gm_pct_prom", "gross_margin_pct")
            .count_distinct("customers", "customer")
            .count("transactions"),
    )?
    .sorted_by(&[SortKey::asc("period"), SortKey::asc("subsidiary")])?;
    let col = |name: &str| agg.column(name);
    let (gross, net, margin) = (col("gross_usd")?, col("net_usd")?, col("gross_margin")?);
    let (pct, customers, transactions) = (col("gm_pct_prom")?, col("customers")?, col("transactions")?);
    Ok(agg
        .iter()
        .map(|g| SubsidiaryKpi {
            period: super::key_text(g.get(AggColumn::Key(0))),
            subsidiary: super::key_text(g.get(AggColumn::Key(1))),
            gross_usd: money(g.number(gross)),
            net_usd: money(g.number(net)),
            gross_margin: money(g.number(margin)),
            gm_pct_prom: ratio(g.number(pct)),
            customers: g.count(customers),
            transactions: g.count(transactions),
            gross_margin_pct_weighted: ratio(share(g.number(margin), g.number(gross))),
        })
        .collect())
}

pub struct BookingsReport;

impl Report for BookingsReport {
    type Output = BookingsSummary;

    const KIND: ReportKind = ReportKind::Bookings;

    fn build(dataset: &Dataset, ctx: &ReportContext) -> Result<BookingsSummary> {
        let (top_clients, concentration) = top_clients(dataset, ctx.config.limits.top_clients)?;
        Ok(BookingsSummary {
            finance_summary: FinanceSummary {
                period: period(dataset, "date")?,
                bookings: bookings(dataset)?,
                gross_margin: gross_margin(dataset)?,
                terms: terms(dataset)?,
                top_clients,
                concentration,
                kpi_by_subsidiary: kpi_by_subsidiary(dataset)?,
            },
            data_sample: data_sample(dataset),
            full_data_reference: ctx.full_data_reference.clone(),
        })
    }
}
