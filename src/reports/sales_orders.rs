// Sales orders by inside sales rep.
//
// One row per sales order. Reps are ranked by booked amount; the top
// customers section keeps the reps whose best customers weigh the most.

use super::transactions::{
    general_summary, kpi_by_rep, status_by_rep, top_customers_by_rep, GeneralSummary, RepKpi,
    RepTopCustomers, StatusByRep, TransactionFields,
};
use super::{Report, ReportContext, ReportKind};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::types::{FieldKind, FieldSpec, Schema};
use serde::Serialize;

const FIELDS: &[FieldSpec] = &[
    FieldSpec::required("create_date", FieldKind::Date),
    FieldSpec::required("status", FieldKind::NullableText),
    FieldSpec::required("inside_sales", FieldKind::NullableText),
    FieldSpec::required("so", FieldKind::Text),
    FieldSpec::required("customer", FieldKind::Text),
    FieldSpec::optional("subsidiary", FieldKind::NullableText),
    FieldSpec::required("amount", FieldKind::Money),
];

pub const SCHEMA: Schema = Schema {
    name: "sales_orders",
    fields: FIELDS,
};

const COLUMNS: TransactionFields<'static> = TransactionFields {
    date: "create_date",
    id: "so",
    rep: "inside_sales",
    customer: "customer",
    status: "status",
    amount: "amount",
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesOrdersSummary {
    pub general_summary: GeneralSummary,
    pub kpi_by_inside: Vec<RepKpi>,
    pub status_by_inside: Vec<StatusByRep>,
    pub top_customers: Vec<RepTopCustomers>,
    pub full_data_reference: Option<String>,
}

pub struct SalesOrdersReport;

impl Report for SalesOrdersReport {
    type Output = SalesOrdersSummary;

    const KIND: ReportKind = ReportKind::SalesOrders;

    fn build(dataset: &Dataset, ctx: &ReportContext) -> Result<SalesOrdersSummary> {
        let limits = &ctx.config.limits;
        Ok(SalesOrdersSummary {
            general_summary: general_summary(dataset, &COLUMNS)?,
            kpi_by_inside: kpi_by_rep(dataset, &COLUMNS)?,
            status_by_inside: status_by_rep(dataset, &COLUMNS)?,
            top_customers: top_customers_by_rep(
                dataset,
                &COLUMNS,
                limits.customers_per_rep,
                limits.reps,
            )?,
            full_data_reference: ctx.full_data_reference.clone(),
        })
    }
}
