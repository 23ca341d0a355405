//! Adaptive granularity for low-activity detection.
//!
//! The requested date range decides a single resolution: a same-day query
//! for today gets daily flags, a multi-day range inside one ISO week gets
//! weekly flags, anything else gets monthly flags. Only the selected
//! resolution is ever populated.

use crate::dataset::Dataset;
use crate::error::Result;
use crate::types::{DateRange, Value};
use crate::util::{iso_week_key, month_key};
use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
}

/// Per-entity activity counts below which an entity is flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LowActivityThresholds {
    pub daily: u32,
    pub weekly: u32,
    pub monthly: u32,
}

impl Default for LowActivityThresholds {
    fn default() -> Self {
        LowActivityThresholds {
            daily: 4,
            weekly: 15,
            monthly: 50,
        }
    }
}

impl LowActivityThresholds {
    pub fn for_granularity(&self, granularity: Granularity) -> u32 {
        match granularity {
            Granularity::Daily => self.daily,
            Granularity::Weekly => self.weekly,
            Granularity::Monthly => self.monthly,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityFlag {
    pub entity: String,
    /// `YYYY-MM-DD`, `YYYY-Www` or `YYYY-MM` depending on the resolution.
    pub period: String,
    pub count: u32,
    pub threshold: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowActivity {
    pub granularity: Granularity,
    pub daily: Vec<ActivityFlag>,
    pub weekly: Vec<ActivityFlag>,
    pub monthly: Vec<ActivityFlag>,
}

/// Pick the resolution for `range` given the injected current date.
pub fn select_granularity(range: DateRange, today: NaiveDate) -> Granularity {
    if range.start == range.end && range.start == today {
        Granularity::Daily
    } else if range.start != range.end && range.start.iso_week() == range.end.iso_week() {
        Granularity::Weekly
    } else {
        Granularity::Monthly
    }
}

fn period_key(granularity: Granularity, day: NaiveDate) -> String {
    match granularity {
        Granularity::Daily => day.format("%Y-%m-%d").to_string(),
        Granularity::Weekly => iso_week_key(day),
        Granularity::Monthly => month_key(day),
    }
}

/// Period keys the range covers at the given resolution, in calendar order.
fn periods(granularity: Granularity, range: DateRange) -> Vec<String> {
    match granularity {
        Granularity::Daily | Granularity::Weekly => vec![period_key(granularity, range.start)],
        Granularity::Monthly => {
            let mut keys = Vec::new();
            let (mut year, mut month) = (range.start.year(), range.start.month());
            let last = (range.end.year(), range.end.month());
            while (year, month) <= last {
                keys.push(format!("{year:04}-{month:02}"));
                if month == 12 {
                    year += 1;
                    month = 1;
                } else {
                    month += 1;
                }
            }
            keys
        }
    }
}

/// Flag every entity whose activity count in a covered period falls below the
/// threshold of the selected resolution.
///
/// Entities are the distinct non-null values of `entity_field` across the
/// whole dataset, so an entity with no records in a period is flagged with a
/// count of zero. Records outside the range or without a date are not counted.
pub fn low_activity(
    dataset: &Dataset,
    entity_field: &str,
    date_field: &str,
    range: DateRange,
    today: NaiveDate,
    thresholds: &LowActivityThresholds,
) -> Result<LowActivity> {
    let entity = dataset.field(entity_field)?;
    let date = dataset.field(date_field)?;
    let granularity = select_granularity(range, today);
    let threshold = thresholds.for_granularity(granularity);
    let covered = periods(granularity, range);

    let mut counts: IndexMap<String, IndexMap<String, u32>> = IndexMap::new();
    for record in dataset.records() {
        let name = match record.get(entity) {
            Value::Null => continue,
            v => v.label(),
        };
        let per_period = counts.entry(name).or_default();
        if let Some(day) = record.date(date).filter(|d| range.contains(*d)) {
            *per_period.entry(period_key(granularity, day)).or_insert(0) += 1;
        }
    }

    let mut flags = Vec::new();
    for period in &covered {
        for (name, per_period) in &counts {
            let count = per_period.get(period).copied().unwrap_or(0);
            if count < threshold {
                flags.push(ActivityFlag {
                    entity: name.clone(),
                    period: period.clone(),
                    count,
                    threshold,
                });
            }
        }
    }
    tracing::debug!(?granularity, flagged = flags.len(), "low activity evaluated");

    let mut result = LowActivity {
        granularity,
        daily: Vec::new(),
        weekly: Vec::new(),
        monthly: Vec::new(),
    };
    match granularity {
        Granularity::Daily => result.daily = flags,
        Granularity::Weekly => result.weekly = flags,
        Granularity::Monthly => result.monthly = flags,
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn same_day_today_is_daily() {
        let today = d(2025, 11, 18);
        assert_eq!(
            select_granularity(DateRange::single_day(today), today),
            Granularity::Daily
        );
    }

    #[test]
    fn same_day_in_the_past_is_monthly() {
        let today = d(2025, 11, 18);
        let day = d(2025, 11, 17);
        assert_eq!(
            select_granularity(DateRange::single_day(day), today),
            Granularity::Monthly
        );
    }

    #[test]
    fn same_iso_week_is_weekly() {
        // Monday and Sunday of ISO week 47 of 2025.
        let range = DateRange::new(d(2025, 11, 17), d(2025, 11, 23)).unwrap();
        assert_eq!(select_granularity(range, d(2025, 11, 18)), Granularity::Weekly);
        // Crossing a year boundary inside one ISO week.
        let range = DateRange::new(d(2024, 12, 30), d(2025, 1, 2)).unwrap();
        assert_eq!(select_granularity(range, d(2025, 1, 2)), Granularity::Weekly);
    }

    #[test]
    fn crossing_weeks_is_monthly() {
        let range = DateRange::new(d(2025, 11, 16), d(2025, 11, 17)).unwrap();
        assert_eq!(select_granularity(range, d(2025, 11, 18)), Granularity::Monthly);
    }

    #[test]
    fn monthly_periods_cover_every_month() {
        let range = DateRange::new(d(2024, 11, 20), d(2025, 2, 1)).unwrap();
        assert_eq!(
            periods(Granularity::Monthly, range),
            vec!["2024-11", "2024-12", "2025-01", "2025-02"]
        );
    }
}
