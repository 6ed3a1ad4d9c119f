//! Error types for trend analysis.

use thiserror::Error;

/// Main error type for trend analysis.
#[derive(Error, Debug)]
pub enum TrendError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Data invariant violated: {0}")]
    DataInvariant(String),

    #[error("Insufficient data: need at least {required} bars, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParseError(#[from] chrono::ParseError),

    #[error("No data loaded")]
    NoData,

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Result type alias for trend analysis operations.
pub type Result<T> = std::result::Result<T, TrendError>;
