// Sold items with their margins.
//
// Revenue is quantity times unit price. Where a unit cost is known the
// margin is weighted from revenue and cost of the costed lines; otherwise
// the mean of the per-line margin percentages stands in. Items with
// positive revenue and a margin below 10% are reported as problematic.

use super::{key_text, Report, ReportContext, ReportKind};
use crate::aggregate::{group_and_reduce, AggColumn, Aggregate, Group, Reducers};
use crate::bucket::{bucket, tally, STANDARD_MARGIN_TIERS};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::rank::{compare_values, top_n_by, Direction, SortKey};
use crate::ratio::{blended_margin, share, MarginBasis};
use crate::types::{FieldKind, FieldSpec, Schema, Value};
use crate::util::{money, opt_money, ratio};
use serde::Serialize;
use std::cmp::Ordering;

const FIELDS: &[FieldSpec] = &[
    FieldSpec::optional("so_number", FieldKind::NullableText),
    FieldSpec::optional("date", FieldKind::Date),
    FieldSpec::optional("customer", FieldKind::NullableText),
    FieldSpec::required("item", FieldKind::NullableText),
    FieldSpec::optional("brand", FieldKind::NullableText),
    FieldSpec::required("product_group", FieldKind::NullableText),
    FieldSpec::required("vendor", FieldKind::NullableText),
    FieldSpec::required("qty", FieldKind::Quantity),
    FieldSpec::required("unit_price", FieldKind::Money),
    FieldSpec::optional("unit_cost", FieldKind::Measure),
    FieldSpec::optional("gross_margin_pct", FieldKind::Ratio),
];

pub const SCHEMA: Schema = Schema {
    name: "sold_items",
    fields: FIELDS,
};

/// Margin tiers below this one make a selling item problematic.
const HEALTHY_TIER: &str = "10-20%";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoldTotals {
    pub total_revenue: f64,
    pub total_qty: f64,
    pub num_items: u64,
    pub num_orders: u64,
    pub num_customers: u64,
    pub margin_pct: f64,
    pub margin_basis: MarginBasis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemRow {
    pub item: Option<String>,
    pub brand: Option<String>,
    pub product_group: Option<String>,
    pub total_qty: f64,
    pub revenue: f64,
    pub cost: Option<f64>,
    pub margin_pct: f64,
    pub margin_basis: MarginBasis,
    pub margin_bucket: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorRow {
    pub vendor: Option<String>,
    pub num_items: u64,
    pub total_qty: f64,
    pub revenue: f64,
    pub margin_pct: f64,
    pub margin_basis: MarginBasis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductGroupRow {
    pub product_group: Option<String>,
    pub num_items: u64,
    pub revenue: f64,
    pub revenue_share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarginBucketRow {
    pub margin_bucket: String,
    pub num_items: u64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distribution {
    pub product_groups: Vec<ProductGroupRow>,
    pub margin_buckets: Vec<MarginBucketRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoldItemsSummary {
    pub general_summary: SoldTotals,
    pub top_items: Vec<ItemRow>,
    pub problematic_items: Vec<ItemRow>,
    pub vendor_summary: Vec<VendorRow>,
    pub distribution: Distribution,
    pub full_data_reference: Option<String>,
}

/// Revenue, cost and costed revenue per line.
fn with_line_economics(dataset: &Dataset) -> Result<Dataset> {
    let qty = dataset.field("qty")?;
    let price = dataset.field("unit_price")?;
    let unit_cost = dataset.field("unit_cost")?;
    let lines = dataset.derive("revenue", FieldKind::Money, |r| {
        Value::Number(r.amount(qty) * r.amount(price))
    });
    let revenue = lines.field("revenue")?;
    let lines = lines.derive("cost", FieldKind::Measure, |r| {
        r.number(unit_cost).map(|c| r.amount(qty) * c).into()
    });
    Ok(lines.derive("costed_revenue", FieldKind::Measure, |r| {
        if r.number(unit_cost).is_some() {
            r.get(revenue).clone()
        } else {
            Value::Null
        }
    }))
}

fn economics() -> Reducers {
    Reducers::new()
        .sum("total_qty", "qty")
        .sum("revenue", "revenue")
        .sum("cost", "cost")
        .sum("costed_revenue", "costed_revenue")
        .mean("row_margin_pct", "gross_margin_pct")
}

fn margin_of(agg: &Aggregate, g: &Group) -> Result<(f64, MarginBasis)> {
    Ok(blended_margin(
        g.number(agg.column("costed_revenue")?),
        g.opt_number(agg.column("cost")?),
        g.opt_number(agg.column("row_margin_pct")?),
    ))
}

fn totals(dataset: &Dataset) -> Result<SoldTotals> {
    let agg = group_and_reduce(dataset, &[], &economics())?;
    let (margin_pct, margin_basis) = match agg.groups().first() {
        Some(g) => margin_of(&agg, g)?,
        None => blended_margin(0.0, None, None),
    };
    Ok(SoldTotals {
        total_revenue: money(dataset.total(dataset.field("revenue")?)),
        total_qty: money(dataset.total(dataset.field("qty")?)),
        num_items: dataset.count_distinct(dataset.field("item")?) as u64,
        num_orders: dataset.count_distinct(dataset.field("so_number")?) as u64,
        num_customers: dataset.count_distinct(dataset.field("customer")?) as u64,
        margin_pct: ratio(margin_pct),
        margin_basis,
    })
}

/// An item row with the unrounded figures it is ranked and tiered by.
#[derive(Debug, Clone)]
struct SoldItem {
    revenue: f64,
    margin: f64,
    row: ItemRow,
}

/// Every item with its blended margin and tier.
fn items(dataset: &Dataset) -> Result<Vec<SoldItem>> {
    let agg = group_and_reduce(dataset, &["item", "brand", "product_group"], &economics())?;
    let (qty, revenue, cost) = (
        agg.column("total_qty")?,
        agg.column("revenue")?,
        agg.column("cost")?,
    );
    agg.iter()
        .map(|g| {
            let (margin_pct, margin_basis) = margin_of(&agg, g)?;
            let row = ItemRow {
                item: key_text(g.get(AggColumn::Key(0))),
                brand: key_text(g.get(AggColumn::Key(1))),
                product_group: key_text(g.get(AggColumn::Key(2))),
                total_qty: money(g.number(qty)),
                revenue: money(g.number(revenue)),
                cost: opt_money(g.opt_number(cost)),
                margin_pct: ratio(margin_pct),
                margin_basis,
                margin_bucket: bucket(margin_pct, &STANDARD_MARGIN_TIERS)?.to_string(),
            };
            Ok(SoldItem {
                revenue: g.number(revenue),
                margin: margin_pct,
                row,
            })
        })
        .collect()
}

/// Selling items whose margin is known and lands in a tier below `HEALTHY_TIER`.
fn is_problematic(item: &SoldItem) -> bool {
    if !is_selling(item) {
        return false;
    }
    let row = &item.row;
    let labels = STANDARD_MARGIN_TIERS.labels();
    let healthy = labels.iter().position(|l| *l == HEALTHY_TIER);
    let tier = labels.iter().position(|l| *l == row.margin_bucket);
    matches!((tier, healthy), (Some(t), Some(h)) if t < h)
}

fn is_selling(item: &SoldItem) -> bool {
    item.revenue > 0.0 && item.row.margin_basis != MarginBasis::Unavailable
}

fn vendor_summary(dataset: &Dataset) -> Result<Vec<VendorRow>> {
    let agg = group_and_reduce(
        dataset,
        &["vendor"],
        &economics().count_distinct("num_items", "item"),
    )?
    .sorted_by(&[SortKey::desc("revenue"), SortKey::asc("vendor")])?;
    let (items, qty, revenue) = (
        agg.column("num_items")?,
        agg.column("total_qty")?,
        agg.column("revenue")?,
    );
    agg.iter()
        .map(|g| {
            let (margin_pct, margin_basis) = margin_of(&agg, g)?;
            Ok(VendorRow {
                vendor: key_text(g.get(AggColumn::Key(0))),
                num_items: g.count(items),
                total_qty: money(g.number(qty)),
                revenue: money(g.number(revenue)),
                margin_pct: ratio(margin_pct),
                margin_basis,
            })
        })
        .collect()
}

fn distribution(dataset: &Dataset, items: &[SoldItem]) -> Result<Distribution> {
    let agg = group_and_reduce(
        dataset,
        &["product_group"],
        &Reducers::new()
            .count_distinct("num_items", "item")
            .sum("revenue", "revenue"),
    )?
    .sorted_by(&[SortKey::desc("revenue"), SortKey::asc("product_group")])?;
    let grand_total = agg.total("revenue")?;
    let (count, revenue) = (agg.column("num_items")?, agg.column("revenue")?);
    let product_groups = agg
        .iter()
        .map(|g| ProductGroupRow {
            product_group: key_text(g.get(AggColumn::Key(0))),
            num_items: g.count(count),
            revenue: money(g.number(revenue)),
            revenue_share: ratio(share(g.number(revenue), grand_total)),
        })
        .collect();

    let margin_buckets = tally(
        &STANDARD_MARGIN_TIERS,
        items
            .iter()
            .filter(|i| is_selling(i))
            .map(|i| (i.margin, i.revenue)),
    )?
    .into_iter()
    .map(|t| MarginBucketRow {
        margin_bucket: t.label,
        num_items: t.count as u64,
        revenue: money(t.amount),
    })
    .collect();

    Ok(Distribution {
        product_groups,
        margin_buckets,
    })
}

fn by_revenue(a: &SoldItem, b: &SoldItem) -> Ordering {
    compare_values(&Value::Number(a.revenue), &Value::Number(b.revenue), Direction::Descending)
}

pub struct SoldItemsReport;

impl Report for SoldItemsReport {
    type Output = SoldItemsSummary;

    const KIND: ReportKind = ReportKind::SoldItems;

    fn build(dataset: &Dataset, ctx: &ReportContext) -> Result<SoldItemsSummary> {
        let lines = with_line_economics(dataset)?;
        let all_items = items(&lines)?;

        let mut problematic: Vec<SoldItem> = all_items
            .iter()
            .filter(|i| is_problematic(i))
            .cloned()
            .collect();
        problematic.sort_by(|a, b| a.margin.total_cmp(&b.margin).then_with(|| by_revenue(a, b)));

        let distribution = distribution(&lines, &all_items)?;
        let top_items = top_n_by(all_items, ctx.config.limits.top_items, by_revenue);

        Ok(SoldItemsSummary {
            general_summary: totals(&lines)?,
            top_items: top_items.into_iter().map(|i| i.row).collect(),
            problematic_items: problematic.into_iter().map(|i| i.row).collect(),
            vendor_summary: vendor_summary(&lines)?,
            distribution,
            full_data_reference: ctx.full_data_reference.clone(),
        })
    }
}
