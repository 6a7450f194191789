//! Upstream tile source contracts.
//!
//! Both contracts may answer [`SourceError::NoData`](crate::SourceError::NoData)
//! for a request the upstream cannot serve. Ingestion loops treat that as a
//! skipped (date, variable) rather than a failure.

use std::fmt;

use agro_common::{BoundingBox, Dataset, GridTile, Variable};
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::SourceResult;

/// Historical gridded observations, one tile per (dataset, variable, date).
#[async_trait]
pub trait ObservationSource: Send + Sync {
    /// Fetch the tile covering `bbox`.
    async fn fetch_grid_tile(
        &self,
        dataset: Dataset,
        variable: Variable,
        date: NaiveDate,
        bbox: &BoundingBox,
    ) -> SourceResult<GridTile>;
}

/// Fields published by the forecast ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForecastField {
    Precipitation,
    /// Daily mean temperature, Kelvin.
    Temperature,
}

impl ForecastField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastField::Precipitation => "precipitation",
            ForecastField::Temperature => "temperature",
        }
    }
}

impl fmt::Display for ForecastField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probabilistic forecast, one daily tile sequence per ensemble member.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    /// Every forecast day of `member` for `field`, ascending by date.
    async fn fetch_ensemble_tiles(
        &self,
        field: ForecastField,
        member: i32,
        bbox: &BoundingBox,
    ) -> SourceResult<Vec<(NaiveDate, GridTile)>>;
}
