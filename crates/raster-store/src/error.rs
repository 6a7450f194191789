//! Error types for the raster store.

use chrono::NaiveDate;
use thiserror::Error;

use agro_common::GridError;

/// Result type alias using StoreError.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the store gateway and the lifecycle components around it.
#[derive(Debug, Error)]
pub enum StoreError {
    // === Precondition violations ===
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Domain '{0}' does not exist")]
    MissingDomain(String),

    #[error("Table {domain}.{table} does not exist")]
    MissingTable { domain: String, table: String },

    #[error("Table {domain}.{table} already exists")]
    TableExists { domain: String, table: String },

    #[error("Table {domain}.{table} is missing {} date(s) between {from} and {to}: {missing:?}", missing.len())]
    IncompleteSeries {
        domain: String,
        table: String,
        from: NaiveDate,
        to: NaiveDate,
        missing: Vec<NaiveDate>,
    },

    #[error("Static parameter '{name}' already exists in {domain}")]
    ParameterExists { domain: String, name: String },

    #[error("Soil point ({lon}, {lat}) already exists in {domain}")]
    DuplicateSoilPoint { domain: String, lon: f64, lat: f64 },

    #[error("Administrative unit '{admin1}' found {count} time(s) in {domain}, expected exactly one")]
    AdminUnit {
        domain: String,
        admin1: String,
        count: u64,
    },

    #[error("Slice key {key} does not fit table {table}")]
    KeyMismatch { table: String, key: String },

    #[error("Parameter name '{0}' must be 1 to 32 characters")]
    InvalidParameterName(String),

    #[error("No slices in {domain}.{table} for {detail}")]
    EmptyAggregate {
        domain: String,
        table: String,
        detail: String,
    },

    // === Extraction failures ===
    #[error("No slice of {domain}.{table} covers point ({lon}, {lat})")]
    NoCoverage {
        domain: String,
        table: String,
        lon: f64,
        lat: f64,
    },

    #[error("Null values in {domain}.{table} at ({lon}, {lat}) on {dates:?}")]
    NullValues {
        domain: String,
        table: String,
        lon: f64,
        lat: f64,
        dates: Vec<NaiveDate>,
    },

    // === Backend failures ===
    #[error("Staging failed: {0}")]
    StagingFailed(String),

    #[error("Raster codec error: {0}")]
    Codec(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error(transparent)]
    Grid(#[from] GridError),
}

impl StoreError {
    /// Create a MissingTable error.
    pub fn missing_table(domain: impl Into<String>, table: impl Into<String>) -> Self {
        Self::MissingTable {
            domain: domain.into(),
            table: table.into(),
        }
    }

    /// Create a DatabaseError with the failing step prefixed.
    pub fn database(step: &str, err: impl std::fmt::Display) -> Self {
        Self::DatabaseError(format!("{} failed: {}", step, err))
    }

    /// Create a Codec error.
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    /// True for errors that describe bad data at a single point, which
    /// callers sampling many points may skip.
    pub fn is_point_data_error(&self) -> bool {
        matches!(self, Self::NoCoverage { .. } | Self::NullValues { .. })
    }

    /// True for errors raised by a failed precondition rather than a backend fault.
    pub fn is_precondition(&self) -> bool {
        !matches!(
            self,
            Self::StagingFailed(_) | Self::Codec(_) | Self::DatabaseError(_) | Self::Grid(_)
        )
    }
}
