//! Error types for the ingestion crate.

use agro_common::GridError;
use raster_store::StoreError;
use thiserror::Error;

/// Errors raised by an upstream tile source.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source has nothing for this request. Callers log and move on.
    #[error("No data for {what}")]
    NoData { what: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid tile in {path}: {reason}")]
    InvalidTile { path: String, reason: String },
}

impl SourceError {
    pub fn no_data(what: impl Into<String>) -> Self {
        Self::NoData { what: what.into() }
    }

    /// True for the soft "nothing upstream" condition.
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData { .. })
    }
}

/// Result type for source operations.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Errors that can occur during ingestion.
#[derive(Error, Debug)]
pub enum IngestionError {
    // === Store ===
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Grid operation failed: {0}")]
    Grid(#[from] GridError),

    // === Upstream ===
    #[error(transparent)]
    Source(#[from] SourceError),

    // === Input files ===
    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Invalid boundary file: {0}")]
    Boundary(String),

    #[error("Invalid soil profile at line {line}: {reason}")]
    SoilProfile { line: usize, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Dataset {dataset} cannot be ingested here: {reason}")]
    UnsupportedDataset { dataset: String, reason: String },
}

impl IngestionError {
    pub fn boundary(msg: impl Into<String>) -> Self {
        Self::Boundary(msg.into())
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;
