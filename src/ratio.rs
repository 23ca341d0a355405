//! Derived ratios computed from aggregate sums.
//!
//! Ratios are always `sum(numerator) / sum(denominator)` over a group, never
//! the mean of per-row ratios. Division is routed through [`DivisionGuard`],
//! which owns the two empty-denominator conventions used across reports.

use crate::aggregate::{group_and_reduce, Aggregate, Reducers};
use crate::dataset::{Dataset, Field};
use crate::error::Result;
use crate::types::Value;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

/// What a division reports when it has nothing to divide by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivisionGuard {
    /// Percentage-of-total displays: no activity means a rate of 0.0.
    ZeroWhenEmpty,
    /// Rates that are undefined without a base (amount hitrates): null.
    NullWhenEmpty,
}

impl DivisionGuard {
    pub fn divide(self, numerator: f64, denominator: f64) -> Option<f64> {
        let q = numerator / denominator;
        if denominator == 0.0 || !q.is_finite() {
            match self {
                DivisionGuard::ZeroWhenEmpty => Some(0.0),
                DivisionGuard::NullWhenEmpty => None,
            }
        } else {
            Some(q)
        }
    }
}

/// Share of a total with the zero convention.
pub fn share(numerator: f64, denominator: f64) -> f64 {
    DivisionGuard::ZeroWhenEmpty
        .divide(numerator, denominator)
        .unwrap_or(0.0)
}

/// Rate with the null convention: undefined when either side is unobserved
/// or the denominator is zero.
pub fn rate(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    DivisionGuard::NullWhenEmpty.divide(numerator?, denominator?)
}

/// Group by `keys`, sum `numerator` and `denominator`, and append the
/// weighted ratio as the `ratio` column (zero convention).
pub fn weighted_ratio_by(
    dataset: &Dataset,
    keys: &[&str],
    numerator: &str,
    denominator: &str,
) -> Result<Aggregate> {
    let reducers = Reducers::new()
        .sum(numerator, numerator)
        .sum(denominator, denominator);
    let agg = group_and_reduce(dataset, keys, &reducers)?;
    let num = agg.column(numerator)?;
    let den = agg.column(denominator)?;
    agg.derive("ratio", |_, g| {
        Ok(Value::Number(share(g.number(num), g.number(den))))
    })
}

/// How a blended margin percentage was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginBasis {
    /// Weighted from revenue and unit cost sums.
    UnitCost,
    /// Simple mean of the per-row margin percentages.
    RowMean,
    /// Neither was available.
    Unavailable,
}

/// Margin percentage with the unit-cost/row-mean precedence: the weighted
/// margin over rows that carry a cost when any cost is observed, otherwise
/// the mean of per-row margin percentages, otherwise 0.0.
pub fn blended_margin(
    costed_revenue: f64,
    cost: Option<f64>,
    mean_row_pct: Option<f64>,
) -> (f64, MarginBasis) {
    match (cost, mean_row_pct) {
        (Some(cost), _) => (share(costed_revenue - cost, costed_revenue), MarginBasis::UnitCost),
        (None, Some(pct)) if pct.is_finite() => (pct, MarginBasis::RowMean),
        _ => (0.0, MarginBasis::Unavailable),
    }
}

/// Which columns describe a two-stage funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunnelSpec<'a> {
    /// Identifies a source-stage entity (a quote, an opportunity).
    pub entity: &'a str,
    /// Downstream identifier; non-null means the entity converted.
    pub link: &'a str,
    /// Source-stage amount, read once per entity.
    pub source_amount: &'a str,
    /// Downstream amount, summed once per distinct (entity, link) pair.
    pub target_amount: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FunnelRates {
    pub total: usize,
    pub converted: usize,
    /// `converted / total`, 0.0 when there are no entities.
    pub hitrate_volume: f64,
    pub source_amount: Option<f64>,
    pub converted_amount: Option<f64>,
    /// `converted_amount / source_amount`; null when either total is zero or
    /// unobserved.
    pub hitrate_amount: Option<f64>,
}

#[derive(Default)]
struct FunnelAcc {
    entities: IndexMap<Value, EntityAcc>,
}

#[derive(Default)]
struct EntityAcc {
    source_amount: Option<f64>,
    links: IndexSet<Value>,
    target_amount: Option<f64>,
}

struct FunnelFields {
    entity: Field,
    link: Field,
    source: Field,
    target: Field,
}

impl FunnelFields {
    fn resolve(dataset: &Dataset, spec: &FunnelSpec) -> Result<Self> {
        Ok(FunnelFields {
            entity: dataset.field(spec.entity)?,
            link: dataset.field(spec.link)?,
            source: dataset.field(spec.source_amount)?,
            target: dataset.field(spec.target_amount)?,
        })
    }
}

impl FunnelAcc {
    fn push(&mut self, record: &crate::dataset::Record, fields: &FunnelFields) {
        let entity = record.get(fields.entity);
        if entity.is_null() {
            return;
        }
        let acc = self.entities.entry(entity.clone()).or_default();
        if acc.source_amount.is_none() {
            acc.source_amount = record.number(fields.source);
        }
        let link = record.get(fields.link);
        if !link.is_null() && acc.links.insert(link.clone()) {
            if let Some(amount) = record.number(fields.target) {
                *acc.target_amount.get_or_insert(0.0) += amount;
            }
        }
    }

    fn finish(self) -> FunnelRates {
        let total = self.entities.len();
        let converted_entities: Vec<&EntityAcc> =
            self.entities.values().filter(|e| !e.links.is_empty()).collect();
        let converted = converted_entities.len();
        let source_amount = sum_observed(self.entities.values().map(|e| e.source_amount));
        let converted_amount = sum_observed(converted_entities.iter().map(|e| e.target_amount));
        // Amount totals of exactly zero carry no information, so both sides
        // must be non-zero for an amount hitrate to exist.
        let hitrate_amount = match (source_amount, converted_amount) {
            (Some(s), Some(c)) if s != 0.0 && c != 0.0 => rate(Some(c), Some(s)),
            _ => None,
        };
        FunnelRates {
            total,
            converted,
            hitrate_volume: share(converted as f64, total as f64),
            source_amount,
            converted_amount,
            hitrate_amount,
        }
    }
}

fn sum_observed(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    values.flatten().fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

/// Volume and amount hitrates of a funnel over the whole dataset.
///
/// Conversion is decided per entity by key: an entity converted when at least
/// one of its records carries a non-null downstream identifier. Records with
/// a null entity key identify nothing and are skipped.
pub fn funnel(dataset: &Dataset, spec: &FunnelSpec) -> Result<FunnelRates> {
    let fields = FunnelFields::resolve(dataset, spec)?;
    let mut acc = FunnelAcc::default();
    for record in dataset.records() {
        acc.push(record, &fields);
    }
    Ok(acc.finish())
}

/// [`funnel`] per value of `group`, in first-seen order.
pub fn funnel_by(dataset: &Dataset, group: &str, spec: &FunnelSpec) -> Result<Vec<(Value, FunnelRates)>> {
    let fields = FunnelFields::resolve(dataset, spec)?;
    let group = dataset.field(group)?;
    let mut groups: IndexMap<Value, FunnelAcc> = IndexMap::new();
    for record in dataset.records() {
        groups
            .entry(record.get(group).clone())
            .or_default()
            .push(record, &fields);
    }
    Ok(groups
        .into_iter()
        .map(|(key, acc)| (key, acc.finish()))
        .collect())
}
