//! Error types for the weather engine.

use agro_common::GridError;
use chrono::NaiveDate;
use raster_store::StoreError;
use thiserror::Error;

/// Errors raised while reconstructing weather or building an ensemble.
#[derive(Error, Debug)]
pub enum EngineError {
    // === Store ===
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Grid operation failed: {0}")]
    Grid(#[from] GridError),

    // === Model fitting ===
    #[error("Model fit failed: {0}")]
    Fit(String),

    #[error("Need at least {needed} training rows, got {found}")]
    InsufficientTraining { needed: usize, found: usize },

    // === Reconstruction ===
    #[error("No historical record in {domain}.{table}")]
    NoHistory { domain: String, table: String },

    #[error("Forecast member {member} is not stored; available: {available:?}")]
    MissingMember { member: i32, available: Vec<i32> },

    #[error("No historical day to repeat for {date}")]
    FallbackGap { date: NaiveDate },

    /// A reconstructed series failed a physical check. The point is dropped.
    #[error("Rejected series at ({lon}, {lat}) on {date}: {reason}")]
    DataQuality {
        lon: f64,
        lat: f64,
        date: NaiveDate,
        reason: String,
    },

    // === Sampling ===
    #[error("Only {found} soil point(s) in '{admin1}', need at least {needed}")]
    InsufficientSamples {
        admin1: String,
        needed: usize,
        found: usize,
    },

    #[error("No weather pixels in '{admin1}' on {date}")]
    NoWeatherPixels { admin1: String, date: NaiveDate },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Simulation ===
    #[error("Crop simulator failed: {0}")]
    Simulator(String),
}

impl EngineError {
    pub fn fit(msg: impl Into<String>) -> Self {
        Self::Fit(msg.into())
    }

    pub fn simulator(msg: impl Into<String>) -> Self {
        Self::Simulator(msg.into())
    }

    /// True when only the one sample point is unusable, so an ensemble
    /// builder may skip it and carry on.
    pub fn is_point_skip(&self) -> bool {
        match self {
            Self::DataQuality { .. } => true,
            Self::Store(e) => e.is_point_data_error(),
            _ => false,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
