//! Schema normalizer: raw columns and rows in, typed [`Dataset`] out.
//!
//! Structural problems (a required column is absent, duplicated columns,
//! ragged rows) abort with an error. Per-cell problems never do: unparseable
//! dates and numbers are coerced to null or zero according to the field kind
//! and counted in the [`NormalizeReport`].

use crate::dataset::{Column, Dataset, Record};
use crate::error::{ReportError, Result};
use crate::types::{FieldKind, RawDataset, Schema, Value};
use crate::util::{parse_date_safe, parse_f64_safe};
use serde_json::Value as Json;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub total_rows: usize,
    /// Cells whose raw value could not be read as the declared kind.
    pub coerced_values: usize,
    /// Optional schema fields the input did not supply.
    pub absent_fields: Vec<&'static str>,
}

/// Column-name matching ignores case, underscores and whitespace, so a
/// query alias `CreateDate` satisfies the field `create_date`.
fn canonical(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn normalize(raw: &RawDataset, schema: &Schema) -> Result<(Dataset, NormalizeReport)> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    for (i, column) in raw.columns.iter().enumerate() {
        if positions.insert(canonical(column), i).is_some() {
            return Err(ReportError::DuplicateField {
                report: schema.name.to_string(),
                field: column.clone(),
            });
        }
    }

    let width = raw.columns.len();
    if let Some((row, values)) = raw
        .rows
        .iter()
        .enumerate()
        .find(|(_, values)| values.len() != width)
    {
        return Err(ReportError::RowWidth {
            row,
            expected: width,
            found: values.len(),
        });
    }

    let mut report = NormalizeReport {
        total_rows: raw.rows.len(),
        ..NormalizeReport::default()
    };
    let mut sources: Vec<Option<usize>> = Vec::with_capacity(schema.fields.len());
    for spec in schema.fields {
        let source = positions.get(&canonical(spec.name)).copied();
        if source.is_none() {
            if spec.required {
                return Err(ReportError::missing(schema.name, spec.name));
            }
            report.absent_fields.push(spec.name);
        }
        sources.push(source);
    }

    let columns: Vec<Column> = schema
        .fields
        .iter()
        .zip(&sources)
        .map(|(spec, source)| Column {
            name: spec.name.to_string(),
            kind: spec.kind,
            present: source.is_some(),
        })
        .collect();

    let mut records = Vec::with_capacity(raw.rows.len());
    for row in &raw.rows {
        let mut values = Vec::with_capacity(columns.len());
        for (spec, source) in schema.fields.iter().zip(&sources) {
            let value = match source {
                Some(i) => {
                    let (value, coerced) = coerce(&row[*i], spec.kind);
                    if coerced {
                        report.coerced_values += 1;
                    }
                    value
                }
                None => spec.kind.default_value(),
            };
            values.push(value);
        }
        records.push(Record::new(values));
    }

    if report.coerced_values > 0 {
        tracing::warn!(
            report = schema.name,
            coerced = report.coerced_values,
            "coerced unparseable values while normalizing"
        );
    }
    tracing::debug!(
        report = schema.name,
        rows = report.total_rows,
        absent = ?report.absent_fields,
        "dataset normalized"
    );

    Ok((Dataset::from_parts(schema.name, columns, records), report))
}

fn is_blank(raw: &Json) -> bool {
    match raw {
        Json::Null => true,
        Json::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Convert one raw cell. The flag is true when a non-blank value had to be
/// discarded.
fn coerce(raw: &Json, kind: FieldKind) -> (Value, bool) {
    match kind {
        FieldKind::Text | FieldKind::NullableText => match raw {
            Json::Null => (Value::Null, false),
            Json::String(s) if kind == FieldKind::NullableText && s.trim().is_empty() => {
                (Value::Null, false)
            }
            Json::String(s) => (Value::Text(s.clone()), false),
            Json::Number(n) => (Value::Text(n.to_string()), false),
            Json::Bool(b) => (Value::Text(b.to_string()), false),
            other => (Value::Text(other.to_string()), true),
        },
        FieldKind::Date => match raw {
            Json::String(s) => match parse_date_safe(Some(s)) {
                Some(d) => (Value::Date(d), false),
                None => (Value::Null, !is_blank(raw)),
            },
            Json::Null => (Value::Null, false),
            _ => (Value::Null, true),
        },
        FieldKind::Money | FieldKind::Quantity | FieldKind::Ratio | FieldKind::Measure => {
            let parsed = match raw {
                Json::Number(n) => n.as_f64().filter(|v| v.is_finite()),
                Json::String(s) => parse_f64_safe(Some(s)),
                _ => None,
            };
            match parsed {
                Some(v) => (Value::Number(v), false),
                None => (kind.default_value(), !is_blank(raw)),
            }
        }
    }
}
