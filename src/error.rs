//! Error types for report generation.

use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ReportError>;

/// Everything that can abort a report request.
///
/// Per-row data quality problems never show up here: the normalizer coerces
/// them to null or zero and only structural problems are raised.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportError {
    /// A field the report needs is not in the dataset.
    #[error("invalid schema for {report}: missing required field `{field}`")]
    InvalidSchema { report: String, field: String },

    /// Two input columns resolve to the same field name.
    #[error("invalid schema for {report}: column `{field}` appears more than once")]
    DuplicateField { report: String, field: String },

    #[error("row {row} has {found} values but {expected} columns were declared")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// A value fell outside every interval of a bucket set without a catch-all.
    #[error("value {value} is outside every bucket of {context}")]
    OutOfRange { value: f64, context: String },

    #[error("invalid bucket boundaries: {0}")]
    InvalidBuckets(String),

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("dataset `{0}` not found")]
    DatasetNotFound(String),

    #[error("invalid dataset reference `{0}`")]
    InvalidReference(String),
}

impl ReportError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReportError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn missing(report: &str, field: &str) -> Self {
        ReportError::InvalidSchema {
            report: report.to_string(),
            field: field.to_string(),
        }
    }
}
