//! Report catalogue.
//!
//! Each report declares the schema it needs and composes the aggregation
//! primitives into its documented output shape. Rounding happens here and
//! nowhere upstream.

pub mod bookings;
pub mod customer_orders;
pub mod delivery;
pub mod opportunities;
pub mod performance;
pub mod quoted_items;
pub mod quotes;
pub mod sales_orders;
pub mod sold_items;
pub mod transactions;

use crate::aggregate::{AggColumn, Aggregate};
use crate::config::EngineConfig;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::normalize::normalize;
use crate::types::{DateRange, FieldKind, RawDataset, Schema, Value};
use crate::util::{money, month_key};
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Everything a report may consult besides its dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportContext {
    /// Current date, injected so date-dependent policy stays deterministic.
    pub today: NaiveDate,
    /// Date range the dataset was retrieved for, when the caller knows it.
    pub range: Option<DateRange>,
    /// Opaque dataset reference echoed back as `full_data_reference`.
    pub full_data_reference: Option<String>,
    pub config: EngineConfig,
}

impl ReportContext {
    pub fn new(today: NaiveDate) -> Self {
        ReportContext {
            today,
            range: None,
            full_data_reference: None,
            config: EngineConfig::default(),
        }
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.full_data_reference = Some(reference.into());
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Requested range, else the span of `date_field` in the data, else today.
    pub fn effective_range(&self, dataset: &Dataset, date_field: &str) -> Result<DateRange> {
        if let Some(range) = self.range {
            return Ok(range);
        }
        let field = dataset.field(date_field)?;
        Ok(match dataset.date_bounds(field) {
            Some((start, end)) => DateRange { start, end },
            None => DateRange::single_day(self.today),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Bookings,
    CustomerOrders,
    SalesOrders,
    Quotes,
    QuotedItems,
    SoldItems,
    Delivery,
    Opportunities,
    Performance,
}

impl ReportKind {
    pub const ALL: [ReportKind; 9] = [
        ReportKind::Bookings,
        ReportKind::CustomerOrders,
        ReportKind::SalesOrders,
        ReportKind::Quotes,
        ReportKind::QuotedItems,
        ReportKind::SoldItems,
        ReportKind::Delivery,
        ReportKind::Opportunities,
        ReportKind::Performance,
    ];

    pub fn schema(self) -> &'static Schema {
        match self {
            ReportKind::Bookings => &bookings::SCHEMA,
            ReportKind::CustomerOrders => &customer_orders::SCHEMA,
            ReportKind::SalesOrders => &sales_orders::SCHEMA,
            ReportKind::Quotes => &quotes::SCHEMA,
            ReportKind::QuotedItems => &quoted_items::SCHEMA,
            ReportKind::SoldItems => &sold_items::SCHEMA,
            ReportKind::Delivery => &delivery::SCHEMA,
            ReportKind::Opportunities => &opportunities::SCHEMA,
            ReportKind::Performance => &performance::SCHEMA,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ReportKind::Bookings => "Bookings, gross margin, terms and client concentration",
            ReportKind::CustomerOrders => "Order timeline, status mix and outliers for one customer",
            ReportKind::SalesOrders => "Sales orders by inside sales rep",
            ReportKind::Quotes => "Quotes by inside sales rep with win rates and incoterms",
            ReportKind::QuotedItems => "Vendors, brands and items appearing on quotes",
            ReportKind::SoldItems => "Sold items with margins and problem items",
            ReportKind::Delivery => "On-time delivery by month",
            ReportKind::Opportunities => "Opportunities by rep with low-activity flags",
            ReportKind::Performance => "Quote to order funnel and rep scorecard",
        }
    }
}

/// A report: a schema plus a pure composition over the normalized dataset.
pub trait Report {
    type Output: Serialize;

    const KIND: ReportKind;

    fn schema() -> &'static Schema {
        Self::KIND.schema()
    }

    fn build(dataset: &Dataset, ctx: &ReportContext) -> Result<Self::Output>;
}

/// Normalize `raw` against the report's schema and build it.
pub fn run<R: Report>(raw: &RawDataset, ctx: &ReportContext) -> Result<R::Output> {
    let (dataset, normalized) = normalize(raw, R::schema())?;
    tracing::info!(
        report = ?R::KIND,
        rows = normalized.total_rows,
        coerced = normalized.coerced_values,
        "building report"
    );
    R::build(&dataset, ctx)
}

fn run_json<R: Report>(raw: &RawDataset, ctx: &ReportContext) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(run::<R>(raw, ctx)?)?)
}

/// [`run`] selected at runtime, returning the JSON document.
pub fn run_kind(kind: ReportKind, raw: &RawDataset, ctx: &ReportContext) -> Result<serde_json::Value> {
    match kind {
        ReportKind::Bookings => run_json::<bookings::BookingsReport>(raw, ctx),
        ReportKind::CustomerOrders => run_json::<customer_orders::CustomerOrdersReport>(raw, ctx),
        ReportKind::SalesOrders => run_json::<sales_orders::SalesOrdersReport>(raw, ctx),
        ReportKind::Quotes => run_json::<quotes::QuotesReport>(raw, ctx),
        ReportKind::QuotedItems => run_json::<quoted_items::QuotedItemsReport>(raw, ctx),
        ReportKind::SoldItems => run_json::<sold_items::SoldItemsReport>(raw, ctx),
        ReportKind::Delivery => run_json::<delivery::DeliveryReport>(raw, ctx),
        ReportKind::Opportunities => run_json::<opportunities::OpportunitiesReport>(raw, ctx),
        ReportKind::Performance => run_json::<performance::PerformanceReport>(raw, ctx),
    }
}

// Shared assembly helpers

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

pub(crate) fn period(dataset: &Dataset, date_field: &str) -> Result<Period> {
    let bounds = dataset.date_bounds(dataset.field(date_field)?);
    Ok(Period {
        start_date: bounds.map(|b| b.0),
        end_date: bounds.map(|b| b.1),
    })
}

/// Add a `YYYY-MM` text column computed from `date_field`; null dates give a
/// null period.
pub(crate) fn with_month(dataset: &Dataset, date_field: &str, output: &str) -> Result<Dataset> {
    let date = dataset.field(date_field)?;
    Ok(dataset.derive(output, FieldKind::NullableText, |r| {
        r.date(date).map(month_key).into()
    }))
}

/// First key of each group mapped to a rounded monetary column.
pub(crate) fn money_by_key(agg: &Aggregate, value: &str) -> Result<IndexMap<String, f64>> {
    let column = agg.column(value)?;
    Ok(agg
        .iter()
        .map(|g| (g.label(AggColumn::Key(0)), money(g.number(column))))
        .collect())
}

pub(crate) fn count_by_key(agg: &Aggregate, value: &str) -> Result<IndexMap<String, u64>> {
    let column = agg.column(value)?;
    Ok(agg
        .iter()
        .map(|g| (g.label(AggColumn::Key(0)), g.count(column)))
        .collect())
}

pub(crate) fn labels(values: &[Value]) -> Vec<String> {
    values.iter().map(Value::label).collect()
}

/// Optional text key of a group, null staying null.
pub(crate) fn key_text(agg_value: &Value) -> Option<String> {
    if agg_value.is_null() {
        None
    } else {
        Some(agg_value.label())
    }
}

/// First and last record as field-name maps; a single record appears twice.
pub(crate) fn data_sample(dataset: &Dataset) -> Vec<IndexMap<String, Value>> {
    let records = dataset.records();
    let (Some(first), Some(last)) = (records.first(), records.last()) else {
        return Vec::new();
    };
    [first, last]
        .into_iter()
        .map(|r| {
            dataset
                .columns()
                .iter()
                .zip(r.values())
                .filter(|(c, _)| c.present)
                .map(|(c, v)| (c.name.clone(), v.clone()))
                .collect()
        })
        .collect()
}
