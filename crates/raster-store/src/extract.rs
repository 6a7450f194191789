//! Point Extraction: one aligned multi-variable series for a point.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, instrument};

use agro_common::{AlignedSeries, Dataset, DateRange, Variable};

use crate::continuity::ContinuityVerifier;
use crate::error::{Result, StoreError};
use crate::gateway::{SliceFilter, SpatialStore};
use crate::tables::{Domain, RasterTable};

#[derive(Clone)]
pub struct PointExtractor {
    store: Arc<dyn SpatialStore>,
    continuity: ContinuityVerifier,
}

impl PointExtractor {
    pub fn new(store: Arc<dyn SpatialStore>) -> Self {
        let continuity = ContinuityVerifier::new(store.clone());
        Self { store, continuity }
    }

    /// Series of every variable in `variables` at `(lon, lat)` over `range`.
    ///
    /// Fails before sampling if any table has a gap in the range, and fails
    /// after alignment if any cell is null. Dataset unit offsets are applied
    /// so temperatures always come back in Kelvin.
    #[instrument(skip_all, fields(domain = %domain, dataset = %dataset, lon = lon, lat = lat))]
    pub async fn series_for_point(
        &self,
        domain: &Domain,
        dataset: Dataset,
        lon: f64,
        lat: f64,
        range: DateRange,
        variables: &[Variable],
        ensemble: Option<i32>,
    ) -> Result<AlignedSeries> {
        for variable in variables {
            let table = RasterTable::Series(dataset, *variable);
            self.continuity
                .require_complete(domain, &table, range, ensemble)
                .await?;
        }

        let mut series = AlignedSeries::new(range.days().collect());
        for variable in variables {
            let table = RasterTable::Series(dataset, *variable);
            let mut filter = SliceFilter::all().dates(range);
            filter.ensemble = ensemble;
            let samples = self
                .store
                .point_sample(domain, &table, lon, lat, &filter)
                .await?;
            if samples.is_empty() {
                return Err(StoreError::NoCoverage {
                    domain: domain.to_string(),
                    table: table.name(),
                    lon,
                    lat,
                });
            }

            // A point on a tile edge can be sampled twice; keep the first value.
            let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
            for sample in samples {
                if let (Some(date), Some(value)) = (sample.date, sample.value) {
                    by_date.entry(date).or_insert(value);
                }
            }

            let nulls: Vec<NaiveDate> = range.days().filter(|d| !by_date.contains_key(d)).collect();
            if !nulls.is_empty() {
                return Err(StoreError::NullValues {
                    domain: domain.to_string(),
                    table: table.name(),
                    lon,
                    lat,
                    dates: nulls,
                });
            }

            let offset = dataset.extraction_offset(*variable);
            series.insert_column(*variable, by_date.into_values().map(|v| v + offset).collect())?;
        }

        debug!(rows = series.len(), "Extracted point series");
        Ok(series)
    }

    /// Value of static parameter `name` at a point, `None` off-grid or on nodata.
    pub async fn static_value(
        &self,
        domain: &Domain,
        lon: f64,
        lat: f64,
        name: &str,
    ) -> Result<Option<f64>> {
        let filter = SliceFilter {
            parameter: Some(name.to_string()),
            ..SliceFilter::default()
        };
        let samples = self
            .store
            .point_sample(domain, &RasterTable::Static, lon, lat, &filter)
            .await?;
        Ok(samples.into_iter().find_map(|s| s.value))
    }
}
