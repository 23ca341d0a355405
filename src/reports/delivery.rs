// On-time delivery per fulfilment month.
//
// Only lines with a fulfilment date and an item count. Rates are over line
// counts, not distinct items.

use super::{count_by_key, key_text, with_month, Report, ReportContext, ReportKind};
use crate::aggregate::{group_and_reduce, AggColumn, Reducers};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::rank::SortKey;
use crate::ratio::share;
use crate::types::{FieldKind, FieldSpec, Schema, Value};
use crate::util::ratio;
use indexmap::IndexMap;
use serde::Serialize;

const FIELDS: &[FieldSpec] = &[
    FieldSpec::required("so_doc_number", FieldKind::NullableText),
    FieldSpec::required("item_name_so", FieldKind::NullableText),
    FieldSpec::required("if_create_date", FieldKind::Date),
    FieldSpec::required("delivery_status", FieldKind::NullableText),
    FieldSpec::optional("po_doc_number", FieldKind::NullableText),
    FieldSpec::optional("po_status", FieldKind::NullableText),
];

pub const SCHEMA: Schema = Schema {
    name: "delivery",
    fields: FIELDS,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthRow {
    pub month: String,
    pub total_items_delivery: u64,
    pub items_on_time: u64,
    pub on_time_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnTimeOverall {
    pub total_items_delivery: u64,
    pub items_on_time: u64,
    pub on_time_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnTimeDelivery {
    pub by_month: Vec<MonthRow>,
    pub overall: OnTimeOverall,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliverySummary {
    pub on_time_delivery: OnTimeDelivery,
    pub total_so_delivery: u64,
    /// Distinct purchase orders per PO status; empty when the input has no
    /// PO columns.
    pub po_status_distribution: IndexMap<String, u64>,
    pub full_data_reference: Option<String>,
}

fn deliverable(dataset: &Dataset, on_time_status: &str) -> Result<Dataset> {
    let date = dataset.field("if_create_date")?;
    let item = dataset.field("item_name_so")?;
    let status = dataset.field("delivery_status")?;
    let valid = dataset.filter(|r| r.date(date).is_some() && !r.get(item).is_null());
    let valid = with_month(&valid, "if_create_date", "month")?;
    Ok(valid.derive("on_time", FieldKind::Quantity, |r| {
        Value::Int(i64::from(r.text(status) == Some(on_time_status)))
    }))
}

fn on_time(valid: &Dataset) -> Result<OnTimeDelivery> {
    let agg = group_and_reduce(
        valid,
        &["month"],
        &Reducers::new()
            .count("total_items_delivery")
            .sum("items_on_time", "on_time"),
    )?
    .sorted_by(&[SortKey::asc("month")])?;
    let (total, hits) = (
        agg.column("total_items_delivery")?,
        agg.column("items_on_time")?,
    );
    let by_month = agg
        .iter()
        .map(|g| MonthRow {
            month: key_text(g.get(AggColumn::Key(0))).unwrap_or_default(),
            total_items_delivery: g.count(total),
            items_on_time: g.number(hits) as u64,
            on_time_pct: ratio(share(g.number(hits), g.count(total) as f64)),
        })
        .collect();

    let items_on_time = valid.total(valid.field("on_time")?);
    Ok(OnTimeDelivery {
        by_month,
        overall: OnTimeOverall {
            total_items_delivery: valid.len() as u64,
            items_on_time: items_on_time as u64,
            on_time_pct: ratio(share(items_on_time, valid.len() as f64)),
        },
    })
}

fn po_status_distribution(dataset: &Dataset) -> Result<IndexMap<String, u64>> {
    if !(dataset.has_field("po_doc_number") && dataset.has_field("po_status")) {
        return Ok(IndexMap::new());
    }
    let agg = group_and_reduce(
        dataset,
        &["po_status"],
        &Reducers::new().count_distinct("count", "po_doc_number"),
    )?;
    let mut distribution = count_by_key(&agg, "count")?;
    distribution.sort_keys();
    Ok(distribution)
}

pub struct DeliveryReport;

impl Report for DeliveryReport {
    type Output = DeliverySummary;

    const KIND: ReportKind = ReportKind::Delivery;

    fn build(dataset: &Dataset, ctx: &ReportContext) -> Result<DeliverySummary> {
        let valid = deliverable(dataset, &ctx.config.statuses.on_time_status)?;
        Ok(DeliverySummary {
            on_time_delivery: on_time(&valid)?,
            total_so_delivery: valid.count_distinct(valid.field("so_doc_number")?) as u64,
            po_status_distribution: po_status_distribution(dataset)?,
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
    use serde_json::{json, Value as Json};

    fn dataset(columns: &[&str], rows: Vec<Vec<Json>>) -> Dataset {
        let columns = columns.iter().map(|c| c.to_string()).collect();
        normalize(&RawDataset::new(columns, rows), &SCHEMA).unwrap().0
    }

    fn summary(ds: &Dataset) -> DeliverySummary {
        let ctx = ReportContext::new(NaiveDate::from_ymd_opt(2025, 12, 1).unwrap());
        DeliveryReport::build(ds, &ctx).unwrap()
    }

    #[test]
    fn rates_are_line_counts_per_month() {
        let ds = dataset(
            &["so_doc_number", "item_name_so", "if_create_date", "delivery_status", "po_doc_number", "po_status"],
            vec![
                vec![json!("SO1"), json!("Valve"), json!("2025-10-02"), json!("On Time"), json!("PO1"), json!("Received")],
                vec![json!("SO1"), json!("Valve"), json!("2025-10-20"), json!("Late"), json!("PO1"), json!("Received")],
                vec![json!("SO2"), json!("Pump"), json!("2025-11-05"), json!("On Time"), json!("PO2"), json!(null)],
                vec![json!("SO3"), json!(""), json!("2025-11-06"), json!("On Time"), json!("PO3"), json!("Pending")],
                vec![json!("SO4"), json!("Seal"), json!(null), json!("On Time"), json!("PO3"), json!("Pending")],
            ],
        );
        let out = summary(&ds);
        let months = &out.on_time_delivery.by_month;
        assert_eq!(months.len(), 2);
        assert_eq!(months[0].month, "2025-10");
        assert_eq!(months[0].total_items_delivery, 2);
        assert_eq!(months[0].on_time_pct, 0.5);
        assert_eq!(months[1].on_time_pct, 1.0);
        assert_eq!(out.on_time_delivery.overall.total_items_delivery, 3);
        assert_eq!(out.on_time_delivery.overall.items_on_time, 2);
        assert_eq!(out.total_so_delivery, 2);

        let statuses: Vec<(&str, u64)> = out
            .po_status_distribution
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        assert_eq!(statuses, vec![("None", 1), ("Pending", 1), ("Received", 1)]);
    }

    #[test]
    fn missing_po_columns_give_an_empty_distribution() {
        let ds = dataset(
            &["so_doc_number", "item_name_so", "if_create_date", "delivery_status"],
            vec![vec![json!("SO1"), json!("Valve"), json!("2025-10-02"), json!("Late")]],
        );
        let out = summary(&ds);
        assert!(out.po_status_distribution.is_empty());
        assert_eq!(out.on_time_delivery.overall.on_time_pct, 0.0);
    }
}
