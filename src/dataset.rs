//! Normalized, typed datasets.
//!
//! A [`Dataset`] is only ever produced by the normalizer (or derived from
//! another dataset); every record carries exactly the declared columns in
//! declaration order. Transformations return new datasets and never mutate
//! the source.

use crate::error::{ReportError, Result};
use crate::types::{FieldKind, Value};
use chrono::NaiveDate;
use std::collections::HashSet;

/// Resolved position of a column inside a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Field(usize);

impl Field {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: FieldKind,
    /// False when an optional field was absent from the input and has been
    /// filled with its kind's default.
    pub present: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record(Vec<Value>);

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Record(values)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn get(&self, field: Field) -> &Value {
        &self.0[field.0]
    }

    pub fn number(&self, field: Field) -> Option<f64> {
        self.get(field).as_f64()
    }

    /// Numeric value with null read as zero.
    pub fn amount(&self, field: Field) -> f64 {
        self.number(field).unwrap_or(0.0)
    }

    pub fn text(&self, field: Field) -> Option<&str> {
        self.get(field).as_str()
    }

    pub fn date(&self, field: Field) -> Option<NaiveDate> {
        self.get(field).as_date()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    name: String,
    columns: Vec<Column>,
    records: Vec<Record>,
}

impl Dataset {
    pub(crate) fn from_parts(name: &str, columns: Vec<Column>, records: Vec<Record>) -> Self {
        Dataset {
            name: name.to_string(),
            columns,
            records,
        }
    }

    /// Name of the schema this dataset was normalized against.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Resolve a column by name, failing with `InvalidSchema` if it is unknown.
    pub fn field(&self, name: &str) -> Result<Field> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .map(Field)
            .ok_or_else(|| ReportError::missing(&self.name, name))
    }

    pub fn kind(&self, field: Field) -> FieldKind {
        self.columns[field.0].kind
    }

    /// Whether the column exists and was supplied by the input.
    pub fn has_field(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name && c.present)
    }

    /// Records satisfying `keep`, as a new dataset with the same columns.
    pub fn filter<F>(&self, keep: F) -> Dataset
    where
        F: Fn(&Record) -> bool,
    {
        Dataset {
            name: self.name.clone(),
            columns: self.columns.clone(),
            records: self.records.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// A new dataset with one computed column appended, or replaced when a
    /// column of that name already exists.
    pub fn derive<F>(&self, name: &str, kind: FieldKind, compute: F) -> Dataset
    where
        F: Fn(&Record) -> Value,
    {
        let existing = self.columns.iter().position(|c| c.name == name);
        let mut columns = self.columns.clone();
        let column = Column {
            name: name.to_string(),
            kind,
            present: true,
        };
        match existing {
            Some(i) => columns[i] = column,
            None => columns.push(column),
        }
        let records = self
            .records
            .iter()
            .map(|r| {
                let value = compute(r);
                let mut values = r.0.clone();
                match existing {
                    Some(i) => values[i] = value,
                    None => values.push(value),
                }
                Record(values)
            })
            .collect();
        Dataset {
            name: self.name.clone(),
            columns,
            records,
        }
    }

    /// Sum of the non-null numeric values of a column.
    pub fn total(&self, field: Field) -> f64 {
        self.records.iter().filter_map(|r| r.number(field)).sum()
    }

    /// Mean over non-null observations; `None` when there are none.
    pub fn mean(&self, field: Field) -> Option<f64> {
        let observed: Vec<f64> = self.records.iter().filter_map(|r| r.number(field)).collect();
        if observed.is_empty() {
            return None;
        }
        Some(observed.iter().sum::<f64>() / observed.len() as f64)
    }

    /// Number of distinct non-null values of a column.
    pub fn count_distinct(&self, field: Field) -> usize {
        self.records
            .iter()
            .map(|r| r.get(field))
            .filter(|v| !v.is_null())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Earliest and latest non-null date of a column.
    pub fn date_bounds(&self, field: Field) -> Option<(NaiveDate, NaiveDate)> {
        let mut dates = self.records.iter().filter_map(|r| r.date(field));
        let first = dates.next()?;
        Some(dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        let columns = vec![
            Column {
                name: "customer".into(),
                kind: FieldKind::Text,
                present: true,
            },
            Column {
                name: "amount".into(),
                kind: FieldKind::Money,
                present: true,
            },
        ];
        let records = vec![
            Record::new(vec![Value::from("A"), Value::Number(10.0)]),
            Record::new(vec![Value::from("B"), Value::Number(-4.0)]),
            Record::new(vec![Value::from("A"), Value::Number(6.0)]),
        ];
        Dataset::from_parts("sample", columns, records)
    }

    #[test]
    fn unknown_field_is_a_schema_error() {
        let err = sample().field("missing").unwrap_err();
        assert!(matches!(
            err,
            ReportError::InvalidSchema { ref field, .. } if field == "missing"
        ));
    }

    #[test]
    fn filter_and_derive_leave_source_untouched() {
        let ds = sample();
        let amount = ds.field("amount").unwrap();
        let positive = ds.filter(|r| r.amount(amount) > 0.0);
        let doubled = ds.derive("double", FieldKind::Money, |r| {
            Value::Number(r.amount(amount) * 2.0)
        });
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.columns().len(), 2);
        assert_eq!(positive.len(), 2);
        let double = doubled.field("double").unwrap();
        assert_eq!(doubled.total(double), 24.0);
    }

    #[test]
    fn aggregates_over_columns() {
        let ds = sample();
        let customer = ds.field("customer").unwrap();
        let amount = ds.field("amount").unwrap();
        assert_eq!(ds.count_distinct(customer), 2);
        assert_eq!(ds.total(amount), 12.0);
        assert_eq!(ds.mean(amount), Some(4.0));
    }
}
