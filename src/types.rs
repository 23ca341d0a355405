use crate::error::{ReportError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// A dataset exactly as the retrieval collaborator hands it over: an ordered
/// column list and equal-length value tuples.
///
/// This is also the on-disk shape used by the dataset store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDataset {
    #[serde(default, rename = "data_set_description", alias = "description")]
    pub description: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl RawDataset {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        RawDataset {
            description: String::new(),
            columns,
            rows,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A canonical scalar after normalization.
///
/// Equality, ordering and hashing are total so values can be used as group
/// keys: `Int` and `Number` compare numerically, floats use `total_cmp`, and
/// across kinds the order is null < numbers < dates < text < lists.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Number(f64),
    Date(NaiveDate),
    Text(String),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_list(&self) -> &[Value] {
        match self {
            Value::List(items) => items,
            _ => &[],
        }
    }

    /// Human-readable label used when a value becomes an output map key.
    /// Null renders as `"None"`.
    pub fn label(&self) -> String {
        match self {
            Value::Null => "None".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Text(s) => s.clone(),
            Value::List(items) => items
                .iter()
                .map(Value::label)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Int(_) | Value::Number(_) => 1,
            Value::Date(_) => 2,
            Value::Text(_) => 3,
            Value::List(_) => 4,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => a.cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => self.rank().cmp(&other.rank()),
            },
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Null => {}
            // Int(1) == Number(1.0), so both hash through the f64 bits.
            Value::Int(_) | Value::Number(_) => {
                self.as_f64().unwrap_or_default().to_bits().hash(state)
            }
            Value::Date(d) => d.hash(state),
            Value::Text(s) => s.hash(state),
            Value::List(items) => items.hash(state),
        }
    }
}

/// Canonical type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// String; empty strings are kept as-is.
    Text,
    /// String where an empty value means null.
    NullableText,
    Date,
    /// Monetary amount; missing or unparseable values become 0.0.
    Money,
    /// Count-like quantity; missing or unparseable values become 0.0.
    Quantity,
    /// Percentage or ratio; missing values stay null.
    Ratio,
    /// Any other numeric observation where absence matters (unit cost, latency).
    Measure,
}

impl FieldKind {
    /// Whether a missing value of this kind means zero rather than "unknown".
    pub fn defaults_to_zero(self) -> bool {
        matches!(self, FieldKind::Money | FieldKind::Quantity)
    }

    pub fn default_value(self) -> Value {
        if self.defaults_to_zero() {
            Value::Number(0.0)
        } else {
            Value::Null
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        FieldSpec {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        FieldSpec {
            name,
            kind,
            required: false,
        }
    }
}

/// The typed record layout a report expects, validated once by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

/// An inclusive calendar range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(ReportError::InvalidRange { start, end });
        }
        Ok(DateRange { start, end })
    }

    pub fn single_day(day: NaiveDate) -> Self {
        DateRange {
            start: day,
            end: day,
        }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn int_and_number_are_the_same_key() {
        let mut set = HashSet::new();
        set.insert(Value::Int(3));
        assert!(set.contains(&Value::Number(3.0)));
        assert_eq!(Value::Int(3).cmp(&Value::Number(3.5)), Ordering::Less);
    }

    #[test]
    fn null_sorts_before_everything() {
        let mut values = vec![
            Value::from("b"),
            Value::Null,
            Value::Number(1.0),
            Value::from("a"),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Number(1.0),
                Value::from("a"),
                Value::from("b")
            ]
        );
    }

    #[test]
    fn null_label_is_none() {
        assert_eq!(Value::Null.label(), "None");
        let d = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
        assert_eq!(Value::Date(d).label(), "2025-11-03");
    }

    #[test]
    fn inverted_range_is_rejected() {
        let a = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        let b = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert!(matches!(
            DateRange::new(a, b),
            Err(ReportError::InvalidRange { .. })
        ));
    }

    #[test]
    fn raw_dataset_reads_store_shape() {
        let raw: RawDataset = serde_json::from_str(
            r#"{"data_set_description":"x","columns":["a"],"rows":[[1],[null]]}"#,
        )
        .unwrap();
        assert_eq!(raw.description, "x");
        assert_eq!(raw.rows.len(), 2);
    }
}
