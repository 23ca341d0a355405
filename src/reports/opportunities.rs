// Opportunities by inside sales rep, with low-activity flags.
//
// Amounts are optional on opportunities, so reps are ranked by how many
// opportunities they opened rather than by amount.

use super::transactions::{
    general_summary, status_by_rep, top_customers, GeneralSummary, RankedCustomer, StatusByRep,
    TransactionFields,
};
use super::{count_by_key, Report, ReportContext, ReportKind};
use crate::aggregate::{group_and_reduce, AggColumn, Reducers};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::granularity::{low_activity, LowActivity};
use crate::rank::{dense_rank_by, SortKey};
use crate::types::{FieldKind, FieldSpec, Schema};
use crate::util::money;
use indexmap::IndexMap;
use serde::Serialize;

const FIELDS: &[FieldSpec] = &[
    FieldSpec::required("op_number", FieldKind::Text),
    FieldSpec::required("tran_date", FieldKind::Date),
    FieldSpec::required("customer", FieldKind::NullableText),
    FieldSpec::optional("subsidiary", FieldKind::NullableText),
    FieldSpec::required("status", FieldKind::NullableText),
    FieldSpec::required("inside_sales", FieldKind::NullableText),
    FieldSpec::optional("amount", FieldKind::Money),
];

pub const SCHEMA: Schema = Schema {
    name: "opportunities",
    fields: FIELDS,
};

const COLUMNS: TransactionFields<'static> = TransactionFields {
    date: "tran_date",
    id: "op_number",
    rep: "inside_sales",
    customer: "customer",
    status: "status",
    amount: "amount",
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepActivity {
    pub inside_sales: String,
    pub num_opportunities: u64,
    pub num_customers: u64,
    pub total_amount: f64,
    pub rank_by_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpportunitiesSummary {
    pub general_summary: GeneralSummary,
    pub kpi_by_inside: Vec<RepActivity>,
    pub status_distribution: IndexMap<String, u64>,
    pub status_by_inside: Vec<StatusByRep>,
    pub top_customers: Vec<RankedCustomer>,
    pub low_activity: LowActivity,
    pub full_data_reference: Option<String>,
}

fn activity_by_rep(dataset: &Dataset) -> Result<Vec<RepActivity>> {
    let agg = group_and_reduce(
        dataset,
        &["inside_sales"],
        &Reducers::new()
            .count_distinct("num_opportunities", "op_number")
            .count_distinct("num_customers", "customer")
            .sum("total_amount", "amount"),
    )?
    .sorted_by(&[SortKey::asc("inside_sales")])?;
    let ranks = dense_rank_by(&agg, "num_opportunities")?;
    let (ops, customers, total) = (
        agg.column("num_opportunities")?,
        agg.column("num_customers")?,
        agg.column("total_amount")?,
    );
    let mut rows: Vec<RepActivity> = agg
        .iter()
        .zip(ranks)
        .map(|(g, rank)| RepActivity {
            inside_sales: g.label(AggColumn::Key(0)),
            num_opportunities: g.count(ops),
            num_customers: g.count(customers),
            total_amount: money(g.number(total)),
            rank_by_count: rank,
        })
        .collect();
    rows.sort_by_key(|r| r.rank_by_count);
    Ok(rows)
}

fn status_distribution(dataset: &Dataset) -> Result<IndexMap<String, u64>> {
    let agg = group_and_reduce(
        dataset,
        &["status"],
        &Reducers::new().count_distinct("count", "op_number"),
    )?
    .sorted_by(&[SortKey::desc("count"), SortKey::asc("status")])?;
    count_by_key(&agg, "count")
}

pub struct OpportunitiesReport;

impl Report for OpportunitiesReport {
    type Output = OpportunitiesSummary;

    const KIND: ReportKind = ReportKind::Opportunities;

    fn build(dataset: &Dataset, ctx: &ReportContext) -> Result<OpportunitiesSummary> {
        let range = ctx.effective_range(dataset, "tran_date")?;
        Ok(OpportunitiesSummary {
            general_summary: general_summary(dataset, &COLUMNS)?,
            kpi_by_inside: activity_by_rep(dataset)?,
            status_distribution: status_distribution(dataset)?,
            status_by_inside: status_by_rep(dataset, &COLUMNS)?,
            top_customers: top_customers(dataset, &COLUMNS, ctx.config.limits.top_customers)?,
            low_activity: low_activity(
                dataset,
                "inside_sales",
                "tran_date",
                range,
                ctx.today,
                &ctx.config.low_activity,
            )?,
            full_data_reference: ctx.full_data_reference.clone(),
        })
    }
}
