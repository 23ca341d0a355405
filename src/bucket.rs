//! Classification of continuous ratios into labelled half-open intervals.

use crate::error::{ReportError, Result};
use once_cell::sync::Lazy;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interval {
    pub low: f64,
    pub high: f64,
    pub label: String,
}

impl Interval {
    /// Membership in `[low, high)`.
    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value < self.high
    }
}

/// Contiguous, ascending intervals scanned in order; the first interval
/// containing a value names its bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketSet {
    name: String,
    intervals: Vec<Interval>,
    fallback: Option<String>,
}

/// Gross-margin tiers: negative, [0, 10%), [10%, 20%), 20% and above.
pub static STANDARD_MARGIN_TIERS: Lazy<BucketSet> = Lazy::new(|| BucketSet {
    name: "margin tiers".to_string(),
    intervals: vec![
        Interval {
            low: f64::NEG_INFINITY,
            high: 0.0,
            label: "negative".to_string(),
        },
        Interval {
            low: 0.0,
            high: 0.10,
            label: "0-10%".to_string(),
        },
        Interval {
            low: 0.10,
            high: 0.20,
            label: "10-20%".to_string(),
        },
        Interval {
            low: 0.20,
            high: f64::INFINITY,
            label: "20%+".to_string(),
        },
    ],
    fallback: None,
});

impl BucketSet {
    /// Build from `n + 1` strictly ascending boundaries and `n` labels. Use
    /// the infinities for open ends.
    pub fn new(name: &str, boundaries: &[f64], labels: &[&str]) -> Result<Self> {
        if labels.is_empty() || boundaries.len() != labels.len() + 1 {
            return Err(ReportError::InvalidBuckets(format!(
                "{name}: {} boundaries for {} labels",
                boundaries.len(),
                labels.len()
            )));
        }
        if boundaries.iter().any(|b| b.is_nan()) {
            return Err(ReportError::InvalidBuckets(format!("{name}: NaN boundary")));
        }
        if boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ReportError::InvalidBuckets(format!(
                "{name}: boundaries must be strictly ascending"
            )));
        }
        let intervals = boundaries
            .windows(2)
            .zip(labels)
            .map(|(w, label)| Interval {
                low: w[0],
                high: w[1],
                label: label.to_string(),
            })
            .collect();
        Ok(BucketSet {
            name: name.to_string(),
            intervals,
            fallback: None,
        })
    }

    /// Catch-all label for values no interval covers.
    pub fn with_fallback(mut self, label: &str) -> Self {
        self.fallback = Some(label.to_string());
        self
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Labels in boundary order, the fallback last.
    pub fn labels(&self) -> Vec<&str> {
        self.intervals
            .iter()
            .map(|i| i.label.as_str())
            .chain(self.fallback.as_deref())
            .collect()
    }

    pub fn assign(&self, value: f64) -> Result<&str> {
        if let Some(interval) = self.intervals.iter().find(|i| i.contains(value)) {
            return Ok(interval.label.as_str());
        }
        self.fallback.as_deref().ok_or_else(|| ReportError::OutOfRange {
            value,
            context: self.name.clone(),
        })
    }

    fn position(&self, label: &str) -> usize {
        self.labels()
            .iter()
            .position(|l| *l == label)
            .unwrap_or(usize::MAX)
    }
}

/// Label of the first interval of `set` containing `ratio`.
pub fn bucket(ratio: f64, set: &BucketSet) -> Result<&str> {
    set.assign(ratio)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketTally {
    pub label: String,
    pub count: usize,
    pub amount: f64,
}

/// Count entities and sum their amounts per bucket. Only observed buckets
/// are returned, in boundary order.
pub fn tally<I>(set: &BucketSet, entries: I) -> Result<Vec<BucketTally>>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut tallies: Vec<BucketTally> = Vec::new();
    for (ratio, amount) in entries {
        let label = set.assign(ratio)?;
        match tallies.iter_mut().find(|t| t.label == label) {
            Some(t) => {
                t.count += 1;
                t.amount += amount;
            }
            None => tallies.push(BucketTally {
                label: label.to_string(),
                count: 1,
                amount,
            }),
        }
    }
    tallies.sort_by_key(|t| set.position(&t.label));
    Ok(tallies)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_tiers_are_half_open() {
        let tiers = &*STANDARD_MARGIN_TIERS;
        assert_eq!(bucket(-0.01, tiers).unwrap(), "negative");
        assert_eq!(bucket(0.0, tiers).unwrap(), "0-10%");
        assert_eq!(bucket(0.0999, tiers).unwrap(), "0-10%");
        assert_eq!(bucket(0.10, tiers).unwrap(), "10-20%");
        assert_eq!(bucket(25.0 / 150.0, tiers).unwrap(), "10-20%");
        assert_eq!(bucket(0.20, tiers).unwrap(), "20%+");
    }

    #[test]
    fn uncovered_values_fail_loudly() {
        let set = BucketSet::new("unit", &[0.0, 1.0], &["in"]).unwrap();
        assert!(matches!(set.assign(1.5), Err(ReportError::OutOfRange { .. })));
        assert!(matches!(
            STANDARD_MARGIN_TIERS.assign(f64::NAN),
            Err(ReportError::OutOfRange { .. })
        ));
        let lenient = set.with_fallback("else");
        assert_eq!(lenient.assign(1.5).unwrap(), "else");
    }

    #[test]
    fn rejects_bad_boundaries() {
        assert!(BucketSet::new("x", &[0.0, 0.0], &["a"]).is_err());
        assert!(BucketSet::new("x", &[0.0, 1.0], &["a", "b"]).is_err());
    }

    #[test]
    fn tally_orders_by_boundary() {
        let tallies = tally(
            &STANDARD_MARGIN_TIERS,
            vec![(0.25, 200.0), (0.05, 10.0), (0.3, 50.0)],
        )
        .unwrap();
        assert_eq!(tallies.len(), 2);
        assert_eq!(tallies[0].label, "0-10%");
        assert_eq!(tallies[1].count, 2);
        assert_eq!(tallies[1].amount, 250.0);
    }

    #[test]
    fn rebucketing_is_idempotent() {
        let ratios = [-0.5, 0.0, 0.05, 0.15, 0.2, 3.0];
        let first: Vec<&str> = ratios
            .iter()
            .map(|r| STANDARD_MARGIN_TIERS.assign(*r).unwrap())
            .collect();
        let second: Vec<&str> = ratios
            .iter()
            .map(|r| STANDARD_MARGIN_TIERS.assign(*r).unwrap())
            .collect();
        assert_eq!(first, second);
    }
}
