//! Engine configuration: every policy knob a report consults.
//!
//! All sections default to the stock policy, so a YAML file only has to name
//! what it changes.

use crate::error::{ReportError, Result};
use crate::granularity::LowActivityThresholds;
use crate::scorecard::{validate_weights, ScoreWeights};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scorecard: ScoreWeights,
    pub low_activity: LowActivityThresholds,
    pub limits: TopLimits,
    pub statuses: StatusLabels,
}

/// Sizes of the top-N lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopLimits {
    pub top_clients: usize,
    pub top_customers: usize,
    pub top_orders: usize,
    pub top_items: usize,
    pub inside_sales_rows: usize,
    pub customers_per_rep: usize,
    pub reps: usize,
}

impl Default for TopLimits {
    fn default() -> Self {
        TopLimits {
            top_clients: 3,
            top_customers: 10,
            top_orders: 5,
            top_items: 10,
            inside_sales_rows: 10,
            customers_per_rep: 3,
            reps: 5,
        }
    }
}

/// Status values with business meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusLabels {
    /// Quote status that counts as won.
    pub won_status: String,
    /// Delivery status that counts as on time.
    pub on_time_status: String,
}

impl Default for StatusLabels {
    fn default() -> Self {
        StatusLabels {
            won_status: "Closed".to_string(),
            on_time_status: "On Time".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ReportError::io(path, e))?;
        let config = Self::from_yaml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_weights(&self.scorecard.kpis())?;

        let t = &self.low_activity;
        if t.daily == 0 || t.weekly == 0 || t.monthly == 0 {
            return Err(ReportError::Config(
                "low activity thresholds must be positive".to_string(),
            ));
        }

        let l = &self.limits;
        let limits = [
            ("top_clients", l.top_clients),
            ("top_customers", l.top_customers),
            ("top_orders", l.top_orders),
            ("top_items", l.top_items),
            ("inside_sales_rows", l.inside_sales_rows),
            ("customers_per_rep", l.customers_per_rep),
            ("reps", l.reps),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, n)| *n == 0) {
            return Err(ReportError::Config(format!("limit `{name}` must be positive")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.limits.top_clients, 3);
        assert_eq!(config.low_activity.weekly, 15);
        assert_eq!(config.statuses.won_status, "Closed");
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let yaml = "
scorecard:
  hitrate_volume: 0.5
  hitrate_amount: 0.3
  response_time: 0.2
limits:
  top_items: 25
";
        let config = EngineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.scorecard.hitrate_volume, 0.5);
        assert_eq!(config.limits.top_items, 25);
        assert_eq!(config.limits.reps, 5);
        assert_eq!(config.low_activity, LowActivityThresholds::default());
    }

    #[test]
    fn rejects_unbalanced_weights() {
        let yaml = "scorecard:\n  hitrate_volume: 0.9\n";
        assert!(matches!(
            EngineConfig::from_yaml_str(yaml),
            Err(ReportError::Config(_))
        ));
    }

    #[test]
    fn rejects_zero_limits() {
        let yaml = "limits:\n  reps: 0\n";
        assert!(EngineConfig::from_yaml_str(yaml).is_err());
    }
}
