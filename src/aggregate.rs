//! Group-by-then-reduce primitives.
//!
//! Every report is a composition of [`group_and_reduce`] calls: the caller
//! names the key fields and a set of [`Reducers`], and gets back an
//! [`Aggregate`] whose groups appear in first-seen order. Any other order
//! has to be asked for explicitly with [`Aggregate::sorted_by`].

use crate::dataset::{Dataset, Field};
use crate::error::{ReportError, Result};
use crate::rank::{compare_rows, SortKey};
use crate::types::{FieldKind, Value};
use indexmap::{IndexMap, IndexSet};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Sum,
    Mean,
    /// Row count of the group; the source field is ignored.
    Count,
    /// Non-null values of the source field.
    CountValues,
    /// Distinct non-null values.
    CountDistinct,
    /// Every value, nulls included, in first-seen order.
    CollectList,
    /// Distinct non-null values, sorted ascending.
    CollectUnique,
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reducer {
    pub output: String,
    pub source: Option<String>,
    pub op: Operation,
}

/// Output-field name to (source field, operation), in output order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reducers(Vec<Reducer>);

impl Reducers {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, output: &str, source: Option<&str>, op: Operation) -> Self {
        self.0.push(Reducer {
            output: output.to_string(),
            source: source.map(str::to_string),
            op,
        });
        self
    }

    pub fn sum(self, output: &str, source: &str) -> Self {
        self.push(output, Some(source), Operation::Sum)
    }

    pub fn mean(self, output: &str, source: &str) -> Self {
        self.push(output, Some(source), Operation::Mean)
    }

    pub fn count(self, output: &str) -> Self {
        self.push(output, None, Operation::Count)
    }

    pub fn count_values(self, output: &str, source: &str) -> Self {
        self.push(output, Some(source), Operation::CountValues)
    }

    pub fn count_distinct(self, output: &str, source: &str) -> Self {
        self.push(output, Some(source), Operation::CountDistinct)
    }

    pub fn collect_list(self, output: &str, source: &str) -> Self {
        self.push(output, Some(source), Operation::CollectList)
    }

    pub fn collect_unique(self, output: &str, source: &str) -> Self {
        self.push(output, Some(source), Operation::CollectUnique)
    }

    pub fn min(self, output: &str, source: &str) -> Self {
        self.push(output, Some(source), Operation::Min)
    }

    pub fn max(self, output: &str, source: &str) -> Self {
        self.push(output, Some(source), Operation::Max)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reducer> {
        self.0.iter()
    }
}

enum Accumulator {
    Sum { total: f64, seen: bool, kind: FieldKind },
    Mean { total: f64, n: usize },
    Count(usize),
    Present(usize),
    Distinct(IndexSet<Value>),
    List(Vec<Value>),
    Unique(BTreeSet<Value>),
    Min(Option<Value>),
    Max(Option<Value>),
}

impl Accumulator {
    fn new(op: Operation, kind: FieldKind) -> Self {
        match op {
            Operation::Sum => Accumulator::Sum {
                total: 0.0,
                seen: false,
                kind,
            },
            Operation::Mean => Accumulator::Mean { total: 0.0, n: 0 },
            Operation::Count => Accumulator::Count(0),
            Operation::CountValues => Accumulator::Present(0),
            Operation::CountDistinct => Accumulator::Distinct(IndexSet::new()),
            Operation::CollectList => Accumulator::List(Vec::new()),
            Operation::CollectUnique => Accumulator::Unique(BTreeSet::new()),
            Operation::Min => Accumulator::Min(None),
            Operation::Max => Accumulator::Max(None),
        }
    }

    fn push(&mut self, value: Option<&Value>) {
        match self {
            Accumulator::Count(n) => *n += 1,
            Accumulator::Present(n) => {
                if value.is_some_and(|v| !v.is_null()) {
                    *n += 1;
                }
            }
            Accumulator::Sum { total, seen, .. } => {
                if let Some(v) = value.and_then(Value::as_f64) {
                    *total += v;
                    *seen = true;
                }
            }
            Accumulator::Mean { total, n } => {
                if let Some(v) = value.and_then(Value::as_f64) {
                    *total += v;
                    *n += 1;
                }
            }
            Accumulator::Distinct(set) => {
                if let Some(v) = value.filter(|v| !v.is_null()) {
                    set.insert(v.clone());
                }
            }
            Accumulator::List(items) => items.push(value.cloned().unwrap_or(Value::Null)),
            Accumulator::Unique(set) => {
                if let Some(v) = value.filter(|v| !v.is_null()) {
                    set.insert(v.clone());
                }
            }
            Accumulator::Min(current) => {
                if let Some(v) = value.filter(|v| !v.is_null()) {
                    if current.as_ref().map_or(true, |c| v < c) {
                        *current = Some(v.clone());
                    }
                }
            }
            Accumulator::Max(current) => {
                if let Some(v) = value.filter(|v| !v.is_null()) {
                    if current.as_ref().map_or(true, |c| v > c) {
                        *current = Some(v.clone());
                    }
                }
            }
        }
    }

    fn finish(self) -> Value {
        match self {
            Accumulator::Sum { total, seen, kind } => {
                // An all-null monetary column sums to zero; an all-null ratio
                // column has no sum at all.
                if seen || kind.defaults_to_zero() {
                    Value::Number(total)
                } else {
                    Value::Null
                }
            }
            Accumulator::Mean { total, n } => {
                if n == 0 {
                    Value::Null
                } else {
                    Value::Number(total / n as f64)
                }
            }
            Accumulator::Count(n) | Accumulator::Present(n) => Value::Int(n as i64),
            Accumulator::Distinct(set) => Value::Int(set.len() as i64),
            Accumulator::List(items) => Value::List(items),
            Accumulator::Unique(set) => Value::List(set.into_iter().collect()),
            Accumulator::Min(v) | Accumulator::Max(v) => v.unwrap_or(Value::Null),
        }
    }
}

/// Handle to a key or value column of an [`Aggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggColumn {
    Key(usize),
    Value(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    key: Vec<Value>,
    values: Vec<Value>,
    size: usize,
}

impl Group {
    pub fn key(&self) -> &[Value] {
        &self.key
    }

    /// Number of records that fell into the group (never zero).
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, column: AggColumn) -> &Value {
        match column {
            AggColumn::Key(i) => &self.key[i],
            AggColumn::Value(i) => &self.values[i],
        }
    }

    /// Numeric value with null read as zero.
    pub fn number(&self, column: AggColumn) -> f64 {
        self.get(column).as_f64().unwrap_or(0.0)
    }

    pub fn opt_number(&self, column: AggColumn) -> Option<f64> {
        self.get(column).as_f64()
    }

    pub fn count(&self, column: AggColumn) -> u64 {
        self.get(column).as_i64().unwrap_or(0).max(0) as u64
    }

    pub fn label(&self, column: AggColumn) -> String {
        self.get(column).label()
    }

    pub fn text(&self, column: AggColumn) -> Option<String> {
        self.get(column).as_str().map(str::to_string)
    }

    pub fn list(&self, column: AggColumn) -> Vec<Value> {
        self.get(column).as_list().to_vec()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    name: String,
    key_fields: Vec<String>,
    value_fields: Vec<String>,
    groups: Vec<Group>,
}

impl Aggregate {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }

    pub fn key_fields(&self) -> &[String] {
        &self.key_fields
    }

    pub fn value_fields(&self) -> &[String] {
        &self.value_fields
    }

    pub fn column(&self, name: &str) -> Result<AggColumn> {
        if let Some(i) = self.key_fields.iter().position(|k| k == name) {
            return Ok(AggColumn::Key(i));
        }
        self.value_fields
            .iter()
            .position(|v| v == name)
            .map(AggColumn::Value)
            .ok_or_else(|| ReportError::missing(&self.name, name))
    }

    /// Sum of a numeric column across all groups.
    pub fn total(&self, name: &str) -> Result<f64> {
        let column = self.column(name)?;
        Ok(self.groups.iter().map(|g| g.number(column)).sum())
    }

    /// Append a computed value column.
    pub fn derive<F>(mut self, name: &str, compute: F) -> Result<Self>
    where
        F: Fn(&Aggregate, &Group) -> Result<Value>,
    {
        let computed = self
            .groups
            .iter()
            .map(|g| compute(&self, g))
            .collect::<Result<Vec<_>>>()?;
        for (group, value) in self.groups.iter_mut().zip(computed) {
            group.values.push(value);
        }
        self.value_fields.push(name.to_string());
        Ok(self)
    }

    /// Stable sort by the given keys; groups equal on every key keep their
    /// current relative order.
    pub fn sorted_by(mut self, keys: &[SortKey]) -> Result<Self> {
        let resolved = keys
            .iter()
            .map(|k| Ok((self.column(&k.field)?, k.direction)))
            .collect::<Result<Vec<_>>>()?;
        self.groups.sort_by(|a, b| compare_rows(a, b, &resolved));
        Ok(self)
    }

    pub fn truncate(mut self, n: usize) -> Self {
        self.groups.truncate(n);
        self
    }
}

/// Group `dataset` by `keys` and reduce each group with `reducers`.
///
/// Groups partition the dataset: every record lands in exactly one group and
/// null key values form their own group. Groups are emitted in the order
/// their first record was seen.
pub fn group_and_reduce(dataset: &Dataset, keys: &[&str], reducers: &Reducers) -> Result<Aggregate> {
    let key_fields: Vec<Field> = keys
        .iter()
        .map(|k| dataset.field(k))
        .collect::<Result<_>>()?;
    let plan: Vec<(Option<Field>, Operation, FieldKind)> = reducers
        .iter()
        .map(|r| {
            let field = r.source.as_deref().map(|s| dataset.field(s)).transpose()?;
            let kind = field.map_or(FieldKind::Quantity, |f| dataset.kind(f));
            Ok((field, r.op, kind))
        })
        .collect::<Result<_>>()?;

    let mut grouped: IndexMap<Vec<Value>, (usize, Vec<Accumulator>)> = IndexMap::new();
    for record in dataset.records() {
        let key: Vec<Value> = key_fields.iter().map(|f| record.get(*f).clone()).collect();
        let entry = grouped.entry(key).or_insert_with(|| {
            let accs = plan
                .iter()
                .map(|(_, op, kind)| Accumulator::new(*op, *kind))
                .collect();
            (0, accs)
        });
        entry.0 += 1;
        for ((field, _, _), acc) in plan.iter().zip(entry.1.iter_mut()) {
            acc.push(field.map(|f| record.get(f)));
        }
    }

    let groups: Vec<Group> = grouped
        .into_iter()
        .map(|(key, (size, accs))| Group {
            key,
            values: accs.into_iter().map(Accumulator::finish).collect(),
            size,
        })
        .collect();
    tracing::debug!(
        dataset = dataset.name(),
        keys = ?keys,
        groups = groups.len(),
        "grouped dataset"
    );

    Ok(Aggregate {
        name: dataset.name().to_string(),
        key_fields: keys.iter().map(|k| k.to_string()).collect(),
        value_fields: reducers.iter().map(|r| r.output.clone()).collect(),
        groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::types::{FieldSpec, RawDataset, Schema};
    use serde_json::json;

    const FIELDS: &[FieldSpec] = &[
        FieldSpec::required("customer", FieldKind::NullableText),
        FieldSpec::required("order", FieldKind::Text),
        FieldSpec::required("amount", FieldKind::Money),
        FieldSpec::optional("pct", FieldKind::Ratio),
    ];
    const SCHEMA: Schema = Schema {
        name: "orders",
        fields: FIELDS,
    };

    fn dataset() -> Dataset {
        let raw = RawDataset::new(
            vec!["customer".into(), "order".into(), "amount".into(), "pct".into()],
            vec![
                vec![json!("B"), json!("o1"), json!(10.0), json!(null)],
                vec![json!("A"), json!("o2"), json!(5.0), json!(0.2)],
                vec![json!("B"), json!("o1"), json!(2.5), json!(null)],
                vec![json!(null), json!("o3"), json!(1.0), json!(0.4)],
                vec![json!("A"), json!("o4"), json!(7.5), json!(null)],
            ],
        );
        normalize(&raw, &SCHEMA).unwrap().0
    }

    #[test]
    fn groups_keep_first_seen_order() {
        let agg = group_and_reduce(&dataset(), &["customer"], &Reducers::new().count("n")).unwrap();
        let labels: Vec<String> = agg
            .iter()
            .map(|g| g.label(AggColumn::Key(0)))
            .collect();
        assert_eq!(labels, vec!["B", "A", "None"]);
    }

    #[test]
    fn reducers_follow_their_null_conventions() {
        let reducers = Reducers::new()
            .sum("amount", "amount")
            .sum("pct_sum", "pct")
            .mean("pct_mean", "pct")
            .count("rows")
            .count_values("with_pct", "pct")
            .count_distinct("orders", "order")
            .collect_list("order_list", "order");
        let agg = group_and_reduce(&dataset(), &["customer"], &reducers).unwrap();
        let b = &agg.groups()[0];
        let col = |n: &str| agg.column(n).unwrap();
        assert_eq!(b.number(col("amount")), 12.5);
        assert!(b.get(col("pct_sum")).is_null());
        assert!(b.get(col("pct_mean")).is_null());
        assert_eq!(b.count(col("rows")), 2);
        assert_eq!(b.count(col("with_pct")), 0);
        assert_eq!(b.count(col("orders")), 1);
        assert_eq!(
            b.list(col("order_list")),
            vec![Value::from("o1"), Value::from("o1")]
        );
        let a = &agg.groups()[1];
        assert_eq!(a.opt_number(col("pct_mean")), Some(0.2));
        assert_eq!(a.count(col("rows")), 2);
        assert_eq!(a.count(col("with_pct")), 1);
    }

    #[test]
    fn min_and_max_skip_nulls() {
        let reducers = Reducers::new()
            .min("pct_min", "pct")
            .max("pct_max", "pct")
            .max("last_order", "order");
        let agg = group_and_reduce(&dataset(), &["customer"], &reducers).unwrap();
        let col = |n: &str| agg.column(n).unwrap();
        let (b, a) = (&agg.groups()[0], &agg.groups()[1]);
        // B only has null percentages.
        assert!(b.get(col("pct_min")).is_null());
        assert!(b.get(col("pct_max")).is_null());
        assert_eq!(a.opt_number(col("pct_min")), Some(0.2));
        assert_eq!(a.opt_number(col("pct_max")), Some(0.2));
        assert_eq!(a.text(col("last_order")).as_deref(), Some("o4"));
    }

    #[test]
    fn min_and_max_compare_ints_and_floats_numerically() {
        let ds = dataset();
        let amount = ds.field("amount").unwrap();
        // Whole amounts become Int, the rest stay Number: 10, 5, 2.5, 1, 7.5.
        let mixed = ds.derive("mixed", FieldKind::Quantity, |r| {
            let v = r.amount(amount);
            if v.fract() == 0.0 {
                Value::Int(v as i64)
            } else {
                Value::Number(v)
            }
        });
        let reducers = Reducers::new().min("low", "mixed").max("high", "mixed");
        let agg = group_and_reduce(&mixed, &[], &reducers).unwrap();
        let g = &agg.groups()[0];
        assert_eq!(g.get(agg.column("low").unwrap()), &Value::Int(1));
        assert_eq!(g.get(agg.column("high").unwrap()), &Value::Int(10));

        let by_customer = group_and_reduce(&mixed, &["customer"], &reducers).unwrap();
        let a = &by_customer.groups()[1];
        assert_eq!(a.get(by_customer.column("low").unwrap()), &Value::Int(5));
        assert_eq!(a.get(by_customer.column("high").unwrap()), &Value::Number(7.5));
    }

    #[test]
    fn group_sums_add_back_to_the_total() {
        let ds = dataset();
        let agg = group_and_reduce(&ds, &["customer"], &Reducers::new().sum("amount", "amount"))
            .unwrap();
        let amount = ds.field("amount").unwrap();
        assert_eq!(agg.total("amount").unwrap(), ds.total(amount));
        assert_eq!(agg.iter().map(Group::size).sum::<usize>(), ds.len());
    }

    #[test]
    fn explicit_sort_is_stable() {
        let agg = group_and_reduce(&dataset(), &["order"], &Reducers::new().count("n"))
            .unwrap()
            .sorted_by(&[SortKey::desc("n")])
            .unwrap();
        let labels: Vec<String> = agg.iter().map(|g| g.label(AggColumn::Key(0))).collect();
        assert_eq!(labels, vec!["o1", "o2", "o3", "o4"]);
    }

    #[test]
    fn unknown_reducer_source_is_a_schema_error() {
        let err = group_and_reduce(&dataset(), &["customer"], &Reducers::new().sum("x", "nope"))
            .unwrap_err();
        assert!(matches!(err, ReportError::InvalidSchema { .. }));
    }
}
