//! Error types for trajectory processing.
//!
//! Legitimately absent data (an empty slice, a shape that's never crossed) is not an error; those
//! operations return `None`. Everything here is a caller mistake or a missing prerequisite.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A parameter is out of range or malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A column needed for the computation is absent
    #[error("Missing column {column}. {hint}")]
    MissingColumn { column: String, hint: String },

    /// An aggregation request that doesn't make sense for the field
    #[error("Unknown aggregation {agg} on field {field}")]
    UnknownAggregation { field: String, agg: String },

    /// The column exists, but holds the wrong kind of values
    #[error("Column {column} should hold {expected} values")]
    TypeMismatch { column: String, expected: String },

    #[error("Parse error: {0}")]
    Parse(String),

    /// An optional capability wasn't registered
    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn missing(column: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
            hint: hint.into(),
        }
    }

    pub fn parse(msg: impl std::fmt::Display) -> Self {
        Self::Parse(msg.to_string())
    }
}
