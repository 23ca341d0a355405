//! KPI reports from flat, row-oriented query results.
//!
//! A raw dataset is normalized against the schema a report declares, then
//! composed from grouping, ratio, bucketing, ranking, granularity and
//! scorecard primitives into a nested, serializable report.

pub mod aggregate;
pub mod bucket;
pub mod config;
pub mod dataset;
pub mod error;
pub mod granularity;
pub mod loader;
pub mod normalize;
pub mod output;
pub mod rank;
pub mod ratio;
pub mod reports;
pub mod scorecard;
pub mod store;
pub mod types;
pub mod util;

pub use config::EngineConfig;
pub use dataset::Dataset;
pub use error::{ReportError, Result};
pub use normalize::normalize;
pub use reports::{run, run_kind, Report, ReportContext, ReportKind};
pub use types::{DateRange, RawDataset, Value};
