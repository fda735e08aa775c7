//! Error taxonomy shared by every pipeline stage.
//!
//! Loaders fail fast: a missing file, a missing column or an unparseable
//! value ends the run. Aggregation-level anomalies are not errors; they are
//! logged and counted in [`crate::stats::RunSummary`] instead.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("required input not found: {}", path.display())]
    InputNotFound { path: PathBuf },
    #[error("table {} is missing expected column '{column}'", path.display())]
    SchemaMismatch { path: PathBuf, column: String },
    #[error("stop '{stop_id}' has neither lat/lon nor easting/northing")]
    MissingCoordinate { stop_id: String },
    #[error("malformed time value: {0}")]
    MalformedTime(String),
    #[error("{}:{line}: {message}", path.display())]
    MalformedRecord {
        path: PathBuf,
        line: u64,
        message: String,
    },
    #[error("invalid date '{0}', expected YYYYMMDD")]
    InvalidDate(String),
    #[error("geography level '{0}' is not configured")]
    UnknownGeography(String),
    #[error("failed to read csv: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Config(#[from] toml::de::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        PipelineError::InputNotFound { path: path.into() }
    }

    pub fn schema(path: impl Into<PathBuf>, column: &str) -> Self {
        PipelineError::SchemaMismatch {
            path: path.into(),
            column: column.to_string(),
        }
    }
}
