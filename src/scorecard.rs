//! Weighted scorecard over min-max normalized KPIs.
//!
//! Each KPI is normalized independently across the entity set, oriented so
//! that 1.0 is always best, combined with a caller-supplied weight vector and
//! scaled to 0-100.

use crate::error::{ReportError, Result};
use crate::rank::dense_rank;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

const WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiDirection {
    HigherIsBetter,
    LowerIsBetter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSpec {
    pub name: String,
    pub weight: f64,
    pub direction: KpiDirection,
}

impl KpiSpec {
    pub fn new(name: &str, weight: f64, direction: KpiDirection) -> Self {
        KpiSpec {
            name: name.to_string(),
            weight,
            direction,
        }
    }
}

/// Weights of the inside-sales scorecard. They must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub hitrate_volume: f64,
    pub hitrate_amount: f64,
    pub response_time: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        ScoreWeights {
            hitrate_volume: 0.40,
            hitrate_amount: 0.35,
            response_time: 0.25,
        }
    }
}

impl ScoreWeights {
    pub fn kpis(&self) -> Vec<KpiSpec> {
        vec![
            KpiSpec::new("hitrate_volume", self.hitrate_volume, KpiDirection::HigherIsBetter),
            KpiSpec::new("hitrate_amount", self.hitrate_amount, KpiDirection::HigherIsBetter),
            KpiSpec::new("response_time", self.response_time, KpiDirection::LowerIsBetter),
        ]
    }
}

/// Raw KPI values of one entity, positionally matching the `KpiSpec` list.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityKpis {
    pub entity: String,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredEntity {
    pub entity: String,
    pub rank: u32,
    pub score: f64,
    /// Oriented, normalized value per KPI as used in the weighted sum.
    pub normalized: IndexMap<String, f64>,
}

pub fn validate_weights(kpis: &[KpiSpec]) -> Result<()> {
    if let Some(bad) = kpis.iter().find(|k| !k.weight.is_finite() || k.weight < 0.0) {
        return Err(ReportError::Config(format!(
            "weight of `{}` must be a non-negative number, got {}",
            bad.name, bad.weight
        )));
    }
    let total: f64 = kpis.iter().map(|k| k.weight).sum();
    if (total - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(ReportError::Config(format!(
            "scorecard weights must sum to 1.0, got {total}"
        )));
    }
    Ok(())
}

/// Min-max normalize the observed values. Unobserved values stay `None`;
/// when every observed value is equal each of them normalizes to 1.0.
pub fn min_max(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let observed = values.iter().flatten().filter(|v| v.is_finite());
    let (min, max) = observed.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(*v), hi.max(*v))
    });
    values
        .iter()
        .map(|v| {
            let v = v.filter(|x| x.is_finite())?;
            if max == min {
                Some(1.0)
            } else {
                Some((v - min) / (max - min))
            }
        })
        .collect()
}

/// Score every entity and sort descending by score; ties keep input order.
pub fn score(entities: &[EntityKpis], kpis: &[KpiSpec]) -> Result<Vec<ScoredEntity>> {
    validate_weights(kpis)?;
    if let Some(bad) = entities.iter().find(|e| e.values.len() != kpis.len()) {
        return Err(ReportError::Config(format!(
            "entity `{}` has {} KPI values for {} KPIs",
            bad.entity,
            bad.values.len(),
            kpis.len()
        )));
    }

    let mut oriented: Vec<Vec<f64>> = vec![Vec::with_capacity(kpis.len()); entities.len()];
    for (k, spec) in kpis.iter().enumerate() {
        let column: Vec<Option<f64>> = entities.iter().map(|e| e.values[k]).collect();
        let uniform = {
            let mut observed = column.iter().flatten();
            observed
                .next()
                .map_or(true, |first| observed.all(|v| v == first))
        };
        for (row, normalized) in min_max(&column).into_iter().enumerate() {
            let value = match (normalized, spec.direction) {
                (None, _) => 0.0,
                // A uniform population is not penalized in either direction.
                (Some(n), KpiDirection::LowerIsBetter) if !uniform => 1.0 - n,
                (Some(n), _) => n,
            };
            oriented[row].push(value);
        }
    }

    let mut scored: Vec<ScoredEntity> = entities
        .iter()
        .zip(&oriented)
        .map(|(entity, values)| {
            let total: f64 = values.iter().zip(kpis).map(|(v, k)| v * k.weight).sum();
            ScoredEntity {
                entity: entity.entity.clone(),
                rank: 0,
                score: (total * 100.0).clamp(0.0, 100.0),
                normalized: kpis
                    .iter()
                    .map(|k| k.name.clone())
                    .zip(values.iter().copied())
                    .collect(),
            }
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    let scores: Vec<f64> = scored.iter().map(|s| s.score).collect();
    for (entity, rank) in scored.iter_mut().zip(dense_rank(&scores)) {
        entity.rank = rank;
    }
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str, values: &[Option<f64>]) -> EntityKpis {
        EntityKpis {
            entity: name.to_string(),
            values: values.to_vec(),
        }
    }

    #[test]
    fn uniform_population_scores_equally() {
        let kpis = ScoreWeights::default().kpis();
        let entities = vec![
            entity("a", &[Some(0.5), Some(0.3), Some(2.0)]),
            entity("b", &[Some(0.5), Some(0.3), Some(2.0)]),
            entity("c", &[Some(0.5), Some(0.3), Some(2.0)]),
        ];
        let scored = score(&entities, &kpis).unwrap();
        for s in &scored {
            assert!(s.normalized.values().all(|v| *v == 1.0));
            assert_eq!(s.score, scored[0].score);
            assert_eq!(s.rank, 1);
        }
        let order: Vec<&str> = scored.iter().map(|s| s.entity.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn lower_latency_scores_higher() {
        let kpis = vec![KpiSpec::new("latency", 1.0, KpiDirection::LowerIsBetter)];
        let entities = vec![entity("slow", &[Some(10.0)]), entity("fast", &[Some(1.0)])];
        let scored = score(&entities, &kpis).unwrap();
        assert_eq!(scored[0].entity, "fast");
        assert_eq!(scored[0].score, 100.0);
        assert_eq!(scored[1].score, 0.0);
    }

    #[test]
    fn missing_kpi_contributes_nothing() {
        let kpis = vec![
            KpiSpec::new("hit", 0.5, KpiDirection::HigherIsBetter),
            KpiSpec::new("latency", 0.5, KpiDirection::LowerIsBetter),
        ];
        let entities = vec![
            entity("a", &[Some(1.0), None]),
            entity("b", &[Some(0.0), Some(3.0)]),
            entity("c", &[Some(0.5), Some(5.0)]),
        ];
        let scored = score(&entities, &kpis).unwrap();
        let a = scored.iter().find(|s| s.entity == "a").unwrap();
        assert_eq!(a.normalized["latency"], 0.0);
        assert_eq!(a.score, 50.0);
        let b = scored.iter().find(|s| s.entity == "b").unwrap();
        assert_eq!(b.score, 50.0);
    }

    #[test]
    fn weights_must_sum_to_one() {
        let kpis = vec![KpiSpec::new("x", 0.7, KpiDirection::HigherIsBetter)];
        assert!(matches!(score(&[], &kpis), Err(ReportError::Config(_))));
        let negative = vec![
            KpiSpec::new("x", 1.5, KpiDirection::HigherIsBetter),
            KpiSpec::new("y", -0.5, KpiDirection::HigherIsBetter),
        ];
        assert!(validate_weights(&negative).is_err());
    }

    #[test]
    fn min_max_handles_ties_and_gaps() {
        assert_eq!(min_max(&[Some(2.0), None, Some(4.0)]), vec![Some(0.0), None, Some(1.0)]);
        assert_eq!(min_max(&[Some(3.0), Some(3.0)]), vec![Some(1.0), Some(1.0)]);
        assert!(min_max(&[]).is_empty());
    }
}
