// Items appearing on quotes: which vendors and brands are quoted, what each
// rep covers, what each customer asks for, and the most valuable items.

use super::{key_text, labels, Report, ReportContext, ReportKind};
use crate::aggregate::{group_and_reduce, AggColumn, Aggregate, Group, Reducers};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::rank::{top_n, SortKey};
use crate::types::{FieldKind, FieldSpec, Schema, Value};
use crate::util::{money, opt_money};
use indexmap::IndexMap;
use serde::Serialize;

const FIELDS: &[FieldSpec] = &[
    FieldSpec::required("customer", FieldKind::NullableText),
    FieldSpec::required("quote", FieldKind::Text),
    FieldSpec::optional("status", FieldKind::NullableText),
    FieldSpec::optional("date", FieldKind::Date),
    FieldSpec::required("item", FieldKind::NullableText),
    FieldSpec::required("brand", FieldKind::NullableText),
    FieldSpec::required("product_group", FieldKind::NullableText),
    FieldSpec::required("qty", FieldKind::Quantity),
    FieldSpec::required("unit_price", FieldKind::Measure),
    FieldSpec::optional("selected_vendor", FieldKind::NullableText),
    FieldSpec::optional("inside_sales", FieldKind::NullableText),
];

pub const SCHEMA: Schema = Schema {
    name: "quoted_items",
    fields: FIELDS,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorRow {
    pub selected_vendor: Option<String>,
    pub num_quotes: u64,
    pub num_lines: u64,
    pub total_qty: f64,
    pub num_customers: u64,
    pub num_brands: u64,
    pub num_product_groups: u64,
    pub total_value: f64,
    pub quotes_list: Vec<String>,
    pub brands_list: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrandRow {
    pub brand: Option<String>,
    pub num_quotes: u64,
    pub num_lines: u64,
    pub total_qty: f64,
    pub num_customers: u64,
    pub num_vendors: u64,
    pub total_value: f64,
    pub quotes_list: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepCoverage {
    pub inside_sales: Option<String>,
    pub num_product_groups: u64,
    pub product_groups_list: Vec<String>,
    pub num_brands: u64,
    pub brands_list: Vec<String>,
    pub num_vendors: u64,
    pub vendors_list: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerBrand {
    pub brand: Option<String>,
    pub num_quotes: u64,
    pub num_lines: u64,
    pub total_qty: f64,
    pub num_vendors: u64,
    pub total_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerBrands {
    pub customer: Option<String>,
    pub brands: Vec<CustomerBrand>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopItem {
    pub item: Option<String>,
    pub brand: Option<String>,
    pub product_group: Option<String>,
    pub num_lines: u64,
    pub total_qty: f64,
    pub avg_price: Option<f64>,
    pub total_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotedItemsSummary {
    pub vendor_summary: Vec<VendorRow>,
    pub brand_summary: Vec<BrandRow>,
    pub inside_sales_summary: Vec<RepCoverage>,
    pub customer_brand: Vec<CustomerBrands>,
    pub top_items_summary: Vec<TopItem>,
    pub full_data_reference: Option<String>,
}

/// Column lookup by output name, bound to one aggregate.
struct Cols<'a>(&'a Aggregate);

impl Cols<'_> {
    fn count(&self, g: &Group, name: &str) -> Result<u64> {
        Ok(g.count(self.0.column(name)?))
    }

    fn money(&self, g: &Group, name: &str) -> Result<f64> {
        Ok(money(g.number(self.0.column(name)?)))
    }

    fn labels(&self, g: &Group, name: &str) -> Result<Vec<String>> {
        Ok(labels(g.get(self.0.column(name)?).as_list()))
    }
}

fn with_line_value(dataset: &Dataset) -> Result<Dataset> {
    let qty = dataset.field("qty")?;
    let price = dataset.field("unit_price")?;
    Ok(dataset.derive("line_value", FieldKind::Money, |r| {
        Value::Number(r.amount(qty) * r.amount(price))
    }))
}

fn vendor_summary(dataset: &Dataset) -> Result<Vec<VendorRow>> {
    let agg = group_and_reduce(
        dataset,
        &["selected_vendor"],
        &Reducers::new()
            .count_distinct("num_quotes", "quote")
            .count_values("num_lines", "item")
            .sum("total_qty", "qty")
            .count_distinct("num_customers", "customer")
            .count_distinct("num_brands", "brand")
            .count_distinct("num_product_groups", "product_group")
            .sum("total_value", "line_value")
            .collect_unique("quotes_list", "quote")
            .collect_unique("brands_list", "brand"),
    )?
    .sorted_by(&[SortKey::desc("num_quotes"), SortKey::desc("num_lines")])?;
    let c = Cols(&agg);
    agg.iter()
        .map(|g| {
            Ok(VendorRow {
                selected_vendor: key_text(g.get(AggColumn::Key(0))),
                num_quotes: c.count(g, "num_quotes")?,
                num_lines: c.count(g, "num_lines")?,
                total_qty: c.money(g, "total_qty")?,
                num_customers: c.count(g, "num_customers")?,
                num_brands: c.count(g, "num_brands")?,
                num_product_groups: c.count(g, "num_product_groups")?,
                total_value: c.money(g, "total_value")?,
                quotes_list: c.labels(g, "quotes_list")?,
                brands_list: c.labels(g, "brands_list")?,
            })
        })
        .collect()
}

fn brand_summary(dataset: &Dataset) -> Result<Vec<BrandRow>> {
    let agg = group_and_reduce(
        dataset,
        &["brand"],
        &Reducers::new()
            .count_distinct("num_quotes", "quote")
            .count_values("num_lines", "item")
            .sum("total_qty", "qty")
            .count_distinct("num_customers", "customer")
            .count_distinct("num_vendors", "selected_vendor")
            .sum("total_value", "line_value")
            .collect_unique("quotes_list", "quote"),
    )?
    .sorted_by(&[SortKey::desc("num_lines"), SortKey::desc("total_qty")])?;
    let c = Cols(&agg);
    agg.iter()
        .map(|g| {
            Ok(BrandRow {
                brand: key_text(g.get(AggColumn::Key(0))),
                num_quotes: c.count(g, "num_quotes")?,
                num_lines: c.count(g, "num_lines")?,
                total_qty: c.money(g, "total_qty")?,
                num_customers: c.count(g, "num_customers")?,
                num_vendors: c.count(g, "num_vendors")?,
                total_value: c.money(g, "total_value")?,
                quotes_list: c.labels(g, "quotes_list")?,
            })
        })
        .collect()
}

fn inside_sales_summary(dataset: &Dataset, limit: usize) -> Result<Vec<RepCoverage>> {
    let agg = group_and_reduce(
        dataset,
        &["inside_sales"],
        &Reducers::new()
            .count_distinct("num_product_groups", "product_group")
            .collect_unique("product_groups_list", "product_group")
            .count_distinct("num_brands", "brand")
            .collect_unique("brands_list", "brand")
            .count_distinct("num_vendors", "selected_vendor")
            .collect_unique("vendors_list", "selected_vendor"),
    )?
    .sorted_by(&[
        SortKey::desc("num_product_groups"),
        SortKey::desc("num_brands"),
        SortKey::desc("num_vendors"),
    ])?
    .truncate(limit);
    let c = Cols(&agg);
    agg.iter()
        .map(|g| {
            Ok(RepCoverage {
                inside_sales: key_text(g.get(AggColumn::Key(0))),
                num_product_groups: c.count(g, "num_product_groups")?,
                product_groups_list: c.labels(g, "product_groups_list")?,
                num_brands: c.count(g, "num_brands")?,
                brands_list: c.labels(g, "brands_list")?,
                num_vendors: c.count(g, "num_vendors")?,
                vendors_list: c.labels(g, "vendors_list")?,
            })
        })
        .collect()
}

fn customer_brand(dataset: &Dataset) -> Result<Vec<CustomerBrands>> {
    let agg = group_and_reduce(
        dataset,
        &["customer", "brand"],
        &Reducers::new()
            .count_distinct("num_quotes", "quote")
            .count_values("num_lines", "item")
            .sum("total_qty", "qty")
            .count_distinct("num_vendors", "selected_vendor")
            .sum("total_value", "line_value"),
    )?
    .sorted_by(&[SortKey::asc("customer"), SortKey::desc("total_qty")])?;
    let c = Cols(&agg);
    let mut by_customer: IndexMap<Value, Vec<CustomerBrand>> = IndexMap::new();
    for g in agg.iter() {
        by_customer
            .entry(g.get(AggColumn::Key(0)).clone())
            .or_default()
            .push(CustomerBrand {
                brand: key_text(g.get(AggColumn::Key(1))),
                num_quotes: c.count(g, "num_quotes")?,
                num_lines: c.count(g, "num_lines")?,
                total_qty: c.money(g, "total_qty")?,
                num_vendors: c.count(g, "num_vendors")?,
                total_value: c.money(g, "total_value")?,
            });
    }
    Ok(by_customer
        .into_iter()
        .map(|(customer, brands)| CustomerBrands {
            customer: key_text(&customer),
            brands,
        })
        .collect())
}

fn top_items(dataset: &Dataset, n: usize) -> Result<Vec<TopItem>> {
    let agg = group_and_reduce(
        dataset,
        &["item", "brand", "product_group"],
        &Reducers::new()
            .count_values("num_lines", "quote")
            .sum("total_qty", "qty")
            .mean("avg_price", "unit_price")
            .sum("total_value", "line_value"),
    )?;
    let top = top_n(agg, &SortKey::desc("total_value"), n, &[SortKey::asc("item")])?;
    let c = Cols(&top);
    let avg_price = top.column("avg_price")?;
    top.iter()
        .map(|g| {
            Ok(TopItem {
                item: key_text(g.get(AggColumn::Key(0))),
                brand: key_text(g.get(AggColumn::Key(1))),
                product_group: key_text(g.get(AggColumn::Key(2))),
                num_lines: c.count(g, "num_lines")?,
                total_qty: c.money(g, "total_qty")?,
                avg_price: opt_money(g.opt_number(avg_price)),
                total_value: c.money(g, "total_value")?,
            })
        })
        .collect()
}

pub struct QuotedItemsReport;

impl Report for QuotedItemsReport {
    type Output = QuotedItemsSummary;

    const KIND: ReportKind = ReportKind::QuotedItems;

    fn build(dataset: &Dataset, ctx: &ReportContext) -> Result<QuotedItemsSummary> {
        let limits = &ctx.config.limits;
        let lines = with_line_value(dataset)?;
        Ok(QuotedItemsSummary {
            vendor_summary: vendor_summary(&lines)?,
            brand_summary: brand_summary(&lines)?,
            inside_sales_summary: inside_sales_summary(&lines, limits.inside_sales_rows)?,
            customer_brand: customer_brand(&lines)?,
            top_items_summary: top_items(&lines, limits.top_items)?,
            full_data_reference: ctx.full_data_reference.clone(),
        })
    }
}
