//! Common types and utilities shared across the crop-weather services.

pub mod bbox;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod resample;
pub mod series;
pub mod statistic;
pub mod time;
pub mod variable;

pub use bbox::BoundingBox;
pub use error::{GridError, GridResult};
pub use geometry::{AdminFeature, MultiPolygon, Polygon};
pub use grid::{GeoTransform, GridTile};
pub use series::AlignedSeries;
pub use statistic::Statistic;
pub use time::DateRange;
pub use variable::{ClimatologyStat, Dataset, DatasetKind, Variable, KELVIN_OFFSET};
