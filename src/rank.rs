//! Deterministic ordering, top-N truncation and dense ranking.
//!
//! All sorts here are stable: rows that compare equal on every key keep the
//! order they arrived in, so repeated runs over the same input always agree.

use crate::aggregate::{AggColumn, Aggregate, Group};
use crate::error::Result;
use crate::types::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    #[default]
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: Direction,
}

impl SortKey {
    pub fn asc(field: &str) -> Self {
        SortKey {
            field: field.to_string(),
            direction: Direction::Ascending,
        }
    }

    pub fn desc(field: &str) -> Self {
        SortKey {
            field: field.to_string(),
            direction: Direction::Descending,
        }
    }
}

/// Compare two values in the given direction. Nulls sort last either way.
pub fn compare_values(a: &Value, b: &Value, direction: Direction) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => match direction {
            Direction::Ascending => a.cmp(b),
            Direction::Descending => b.cmp(a),
        },
    }
}

pub(crate) fn compare_rows(a: &Group, b: &Group, keys: &[(AggColumn, Direction)]) -> Ordering {
    keys.iter()
        .map(|(column, direction)| compare_values(a.get(*column), b.get(*column), *direction))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// First `n` groups after sorting by `sort_key`, with `tie_breaks` applied in
/// order for exact ties. Ties left unresolved keep first-seen order.
pub fn top_n(
    aggregate: Aggregate,
    sort_key: &SortKey,
    n: usize,
    tie_breaks: &[SortKey],
) -> Result<Aggregate> {
    let mut keys = Vec::with_capacity(tie_breaks.len() + 1);
    keys.push(sort_key.clone());
    keys.extend(tie_breaks.iter().cloned());
    Ok(aggregate.sorted_by(&keys)?.truncate(n))
}

/// Stable top-N over arbitrary rows.
pub fn top_n_by<T, F>(mut items: Vec<T>, n: usize, compare: F) -> Vec<T>
where
    F: FnMut(&T, &T) -> Ordering,
{
    items.sort_by(compare);
    items.truncate(n);
    items
}

/// Dense rank, highest value first: ties share a rank and no rank number is
/// skipped. Ranks are returned in input order.
pub fn dense_rank(values: &[f64]) -> Vec<u32> {
    let mut distinct: Vec<f64> = values.to_vec();
    distinct.sort_by(|a, b| b.total_cmp(a));
    distinct.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
    values
        .iter()
        .map(|v| {
            let pos = distinct
                .iter()
                .position(|d| d.total_cmp(v) == Ordering::Equal)
                .unwrap_or(distinct.len());
            pos as u32 + 1
        })
        .collect()
}

/// Dense rank of every group by a numeric column, highest first.
pub fn dense_rank_by(aggregate: &Aggregate, field: &str) -> Result<Vec<u32>> {
    let column = aggregate.column(field)?;
    let values: Vec<f64> = aggregate.iter().map(|g| g.number(column)).collect();
    Ok(dense_rank(&values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{group_and_reduce, Reducers};
    use crate::normalize::normalize;
    use crate::types::{FieldKind, FieldSpec, RawDataset, Schema};
    use serde_json::json;

    const FIELDS: &[FieldSpec] = &[
        FieldSpec::required("name", FieldKind::Text),
        FieldSpec::required("amount", FieldKind::Money),
    ];
    const SCHEMA: Schema = Schema {
        name: "names",
        fields: FIELDS,
    };

    fn amounts(rows: &[(&str, f64)]) -> Aggregate {
        let raw = RawDataset::new(
            vec!["name".into(), "amount".into()],
            rows.iter().map(|(n, a)| vec![json!(n), json!(a)]).collect(),
        );
        let ds = normalize(&raw, &SCHEMA).unwrap().0;
        group_and_reduce(&ds, &["name"], &Reducers::new().sum("amount", "amount")).unwrap()
    }

    fn names(agg: &Aggregate) -> Vec<String> {
        agg.iter().map(|g| g.label(AggColumn::Key(0))).collect()
    }

    #[test]
    fn ties_resolve_by_tie_break_then_truncate() {
        let agg = amounts(&[("zeta", 50.0), ("alpha", 50.0), ("mid", 30.0)]);
        let top = top_n(agg, &SortKey::desc("amount"), 2, &[SortKey::asc("name")]).unwrap();
        assert_eq!(names(&top), vec!["alpha", "zeta"]);
    }

    #[test]
    fn unresolved_ties_keep_first_seen_order() {
        let agg = amounts(&[("b", 5.0), ("a", 5.0), ("c", 9.0)]);
        let top = top_n(agg, &SortKey::desc("amount"), 3, &[]).unwrap();
        assert_eq!(names(&top), vec!["c", "b", "a"]);
    }

    #[test]
    fn dense_rank_shares_ranks_without_gaps() {
        assert_eq!(dense_rank(&[10.0, 30.0, 10.0, 20.0]), vec![3, 1, 3, 2]);
        assert!(dense_rank(&[]).is_empty());
    }

    #[test]
    fn nulls_sort_last_in_both_directions() {
        let one = Value::Number(1.0);
        assert_eq!(
            compare_values(&Value::Null, &one, Direction::Ascending),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(&Value::Null, &one, Direction::Descending),
            Ordering::Greater
        );
    }
}
