use crate::error::{ReportError, Result};
use crate::util::{format_int, format_number};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s).map_err(|e| ReportError::io(path, e))?;
    Ok(())
}

/// An array of records found somewhere inside a report document.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatTable {
    /// Dotted path of the array inside the document.
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Every non-empty array of objects in `doc`, depth first. Headers come from
/// the first object; nested arrays of objects become tables of their own.
pub fn flat_tables(doc: &Value) -> Vec<FlatTable> {
    let mut tables = Vec::new();
    collect_tables("", doc, &mut tables);
    tables
}

fn collect_tables(path: &str, value: &Value, out: &mut Vec<FlatTable>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                collect_tables(&child_path, child, out);
            }
        }
        Value::Array(items) => {
            let Some(Value::Object(first)) = items.first() else {
                return;
            };
            let headers: Vec<String> = first.keys().cloned().collect();
            let rows = items
                .iter()
                .filter_map(Value::as_object)
                .map(|obj| {
                    headers
                        .iter()
                        .map(|h| obj.get(h).cloned().unwrap_or(Value::Null))
                        .collect()
                })
                .collect();
            out.push(FlatTable {
                name: path.to_string(),
                headers,
                rows,
            });
            for (i, item) in items.iter().enumerate() {
                if let Value::Object(map) = item {
                    for (key, child) in map {
                        if child.is_array() {
                            collect_tables(&format!("{path}[{i}].{key}"), child, out);
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items.iter().map(cell).collect::<Vec<_>>().join("; "),
        Value::Object(_) => value.to_string(),
    }
}

fn display_cell(value: &Value) -> String {
    match value {
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => format_int(i),
            (None, Some(f)) => format_number(f, 2),
            _ => n.to_string(),
        },
        Value::Array(items) if items.len() > 3 => format!("[{} items]", format_int(items.len())),
        _ => cell(value),
    }
}

pub fn write_csv(path: &Path, table: &FlatTable) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(&table.headers)?;
    for row in &table.rows {
        wtr.write_record(row.iter().map(cell))?;
    }
    wtr.flush().map_err(|e| ReportError::io(path, e))?;
    Ok(())
}

/// Markdown rendering of the first `max_rows` rows, numbers with thousands
/// separators.
pub fn render_markdown(table: &FlatTable, max_rows: usize) -> String {
    if table.rows.is_empty() {
        return "(no rows)".to_string();
    }
    let mut builder = Builder::default();
    builder.push_record(table.headers.iter().cloned());
    for row in table.rows.iter().take(max_rows) {
        builder.push_record(row.iter().map(display_cell));
    }
    builder.build().with(Style::markdown()).to_string()
}

pub fn preview_tables(doc: &Value, max_rows: usize) {
    for table in flat_tables(doc) {
        println!("{}", table.name);
        println!("{}", render_markdown(&table, max_rows));
        if table.rows.len() > max_rows {
            println!("({} of {} rows shown)", max_rows, format_int(table.rows.len()));
        }
        println!();
    }
}
