//! Error types for grid and geometry handling.

use thiserror::Error;

/// Result type alias using GridError.
pub type GridResult<T> = Result<T, GridError>;

/// Errors raised by grid algebra, geometry parsing and value parsing.
#[derive(Debug, Error)]
pub enum GridError {
    #[error("Grid data length {actual} does not match {width}x{height}")]
    ShapeMismatch {
        width: usize,
        height: usize,
        actual: usize,
    },

    #[error("Grids are not aligned: {0}")]
    NotAligned(String),

    #[error("Grid is empty")]
    Empty,

    #[error("Invalid WKT geometry: {0}")]
    InvalidWkt(String),

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("Unknown statistic: {0}")]
    UnknownStatistic(String),

    #[error("Series mismatch: {0}")]
    SeriesMismatch(String),

    #[error("Invalid date range: {from} is after {to}")]
    InvalidDateRange {
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
    },
}
