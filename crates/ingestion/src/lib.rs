//! Ingestion of gridded weather, soil and static data into the raster store.
//!
//! # Architecture
//!
//! Upstream data arrives through two source contracts:
//!
//! - [`ObservationSource`]: one historical tile per (dataset, variable, date)
//! - [`ForecastSource`]: a daily tile sequence per forecast ensemble member
//!
//! [`DirectorySource`] implements both over a local tree of JSON tiles. The
//! ingesters crop to the padded domain envelope and hand every slice to the
//! store's staged ingestion, so re-running a date replaces it in place.
//! An upstream "no data" answer is logged and skipped; every other failure
//! stops the run.

pub mod bias;
pub mod boundary;
pub mod config;
pub mod error;
pub mod file_source;
pub mod forecast;
pub mod reanalysis;
pub mod soil;
pub mod source;
pub mod static_params;

pub use boundary::{load_boundary, parse_boundary};
pub use config::IngestionConfig;
pub use error::{IngestionError, Result, SourceError, SourceResult};
pub use file_source::{read_tile, DirectorySource};
pub use forecast::{ForecastIngester, MemberReport};
pub use reanalysis::{ReanalysisIngester, RecordReport};
pub use soil::{parse_profiles, SoilIngester, SoilProfile};
pub use source::{ForecastField, ForecastSource, ObservationSource};
pub use static_params::StaticIngester;
