//! The Spatial Store Gateway contract.
//!
//! A thin async interface to a spatial database holding raster and vector
//! relations. The lifecycle components (schema, staging, continuity,
//! extraction, climatology) own the protocol; implementations of
//! [`SpatialStore`] own physical storage and transaction boundaries.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use agro_common::{AdminFeature, BoundingBox, DateRange, GridTile, MultiPolygon, Statistic};

use crate::error::Result;
use crate::tables::{Domain, RasterTable, SliceKey, SliceTags, TableDescriptor};

/// Selects rows of a raster table by their tag columns. Unset fields match all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliceFilter {
    pub dates: Option<DateRange>,
    pub ensemble: Option<i32>,
    pub parameter: Option<String>,
    pub statistic: Option<String>,
    pub month: Option<u32>,
    /// Only dates whose calendar month equals this value.
    pub date_month: Option<u32>,
}

impl SliceFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter matching exactly the rows stored under `key`.
    pub fn for_key(key: &SliceKey) -> Self {
        let tags = key.tags();
        Self {
            dates: tags.date.map(|d| DateRange { from: d, to: d }),
            ensemble: tags.ensemble,
            parameter: tags.parameter,
            statistic: tags.statistic,
            month: tags.month,
            date_month: None,
        }
    }

    pub fn dates(mut self, range: DateRange) -> Self {
        self.dates = Some(range);
        self
    }

    pub fn ensemble(mut self, ensemble: i32) -> Self {
        self.ensemble = Some(ensemble);
        self
    }

    pub fn date_month(mut self, month: u32) -> Self {
        self.date_month = Some(month);
        self
    }

    pub fn matches(&self, tags: &SliceTags) -> bool {
        use chrono::Datelike;

        let date_ok = match (&self.dates, tags.date) {
            (Some(range), Some(d)) => range.contains(d),
            (Some(_), None) => false,
            (None, _) => true,
        };
        let month_of_date_ok = match (self.date_month, tags.date) {
            (Some(m), Some(d)) => d.month() == m,
            (Some(_), None) => false,
            (None, _) => true,
        };
        date_ok
            && month_of_date_ok
            && opt_eq(&self.ensemble, &tags.ensemble)
            && opt_eq(&self.parameter, &tags.parameter)
            && opt_eq(&self.statistic, &tags.statistic)
            && opt_eq(&self.month, &tags.month)
    }
}

fn opt_eq<T: PartialEq>(wanted: &Option<T>, actual: &Option<T>) -> bool {
    match wanted {
        Some(w) => actual.as_ref() == Some(w),
        None => true,
    }
}

/// One table and the rows it contributes to an aggregate.
#[derive(Debug, Clone)]
pub struct AggregateSource {
    pub table: RasterTable,
    pub filter: SliceFilter,
}

/// Cell-wise union of raster rows drawn from one or more tables.
///
/// When `per_date` is set, rows sharing a date are first collapsed with it;
/// the results (or the raw rows) are then collapsed with `statistic`.
#[derive(Debug, Clone)]
pub struct AggregateRequest {
    pub sources: Vec<AggregateSource>,
    pub per_date: Option<Statistic>,
    pub statistic: Statistic,
}

impl AggregateRequest {
    pub fn single(table: RasterTable, filter: SliceFilter, statistic: Statistic) -> Self {
        Self {
            sources: vec![AggregateSource { table, filter }],
            per_date: None,
            statistic,
        }
    }
}

/// Value of one stored row at a point. `value` is `None` on a nodata cell.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSample {
    pub date: Option<NaiveDate>,
    pub ensemble: Option<i32>,
    pub value: Option<f64>,
}

/// Which crop mask flag a soil query requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoilMask {
    Primary,
    Secondary,
}

/// A soil profile located at a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilPoint {
    pub lon: f64,
    pub lat: f64,
    pub mask1: bool,
    pub mask2: bool,
    pub profile: String,
}

impl SoilPoint {
    pub fn passes(&self, mask: Option<SoilMask>) -> bool {
        match mask {
            None => true,
            Some(SoilMask::Primary) => self.mask1,
            Some(SoilMask::Secondary) => self.mask2,
        }
    }
}

/// Name of a staging relation. Created by [`SpatialStore::load_staging`],
/// removed by [`SpatialStore::drop_staging`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingRelation {
    pub name: String,
}

/// Row counts of a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub replaced: u64,
    pub inserted: u64,
}

/// Spatial database operations used by the store lifecycle.
#[async_trait]
pub trait SpatialStore: Send + Sync {
    // === Namespaces and tables ===

    async fn create_namespace(&self, domain: &Domain) -> Result<()>;

    async fn namespace_exists(&self, domain: &Domain) -> Result<bool>;

    async fn table_exists(&self, domain: &Domain, table: &str) -> Result<bool>;

    /// Create a table with the descriptor's columns and indexes.
    async fn create_table(
        &self,
        domain: &Domain,
        table: &str,
        descriptor: &'static TableDescriptor,
    ) -> Result<()>;

    async fn drop_table(&self, domain: &Domain, table: &str) -> Result<()>;

    // === Boundary ===

    /// Replace the `admin` table with the given features.
    async fn replace_boundary(&self, domain: &Domain, features: &[AdminFeature]) -> Result<()>;

    /// Recreate the cached envelope of the boundary union.
    async fn refresh_envelope(&self, domain: &Domain) -> Result<()>;

    /// Cached envelope; `None` when the view is missing or the boundary is empty.
    async fn envelope(&self, domain: &Domain) -> Result<Option<BoundingBox>>;

    /// Geometries of every boundary feature labelled `admin1`.
    async fn admin_geometries(&self, domain: &Domain, admin1: &str) -> Result<Vec<MultiPolygon>>;

    // === Staging ===

    /// Create the staging relation and load the tile into it, split into
    /// tiles of at most `tile_size` cells per side where the backend tiles
    /// rasters.
    async fn load_staging(
        &self,
        staging: &StagingRelation,
        tile: &GridTile,
        tile_size: usize,
    ) -> Result<()>;

    /// Add the key's tag columns to every staged row and index them.
    async fn tag_staging(&self, staging: &StagingRelation, key: &SliceKey) -> Result<()>;

    /// In one transaction, delete rows matching `replace` (if any) and copy
    /// every staged row into the permanent table.
    async fn merge_staging(
        &self,
        staging: &StagingRelation,
        domain: &Domain,
        table: &RasterTable,
        replace: Option<&SliceFilter>,
    ) -> Result<MergeOutcome>;

    async fn drop_staging(&self, staging: &StagingRelation) -> Result<()>;

    // === Raster queries ===

    async fn distinct_dates(
        &self,
        domain: &Domain,
        table: &RasterTable,
        filter: &SliceFilter,
    ) -> Result<BTreeSet<NaiveDate>>;

    async fn latest_date(&self, domain: &Domain, table: &RasterTable) -> Result<Option<NaiveDate>>;

    async fn ensemble_members(&self, domain: &Domain, table: &RasterTable) -> Result<Vec<i32>>;

    /// Number of distinct slice keys matching the filter.
    async fn count_slices(
        &self,
        domain: &Domain,
        table: &RasterTable,
        filter: &SliceFilter,
    ) -> Result<u64>;

    /// Delete matching rows, returning the number of rows removed.
    async fn delete_slices(
        &self,
        domain: &Domain,
        table: &RasterTable,
        filter: &SliceFilter,
    ) -> Result<u64>;

    /// Sample every matching row whose extent contains the point, ordered by date.
    async fn point_sample(
        &self,
        domain: &Domain,
        table: &RasterTable,
        lon: f64,
        lat: f64,
        filter: &SliceFilter,
    ) -> Result<Vec<PointSample>>;

    /// Cell-wise union; `None` when no row matches.
    async fn union_aggregate(
        &self,
        domain: &Domain,
        request: &AggregateRequest,
    ) -> Result<Option<GridTile>>;

    /// Centres of the valid pixels of the slices on `date`, clipped to `admin1`.
    async fn pixel_centroids(
        &self,
        domain: &Domain,
        table: &RasterTable,
        date: NaiveDate,
        admin1: &str,
    ) -> Result<Vec<(f64, f64)>>;

    // === Soil ===

    /// Insert all points in one transaction; a duplicate location fails the batch.
    async fn insert_soils(&self, domain: &Domain, points: &[SoilPoint]) -> Result<u64>;

    /// Soil points inside `admin1` passing the mask.
    async fn soils(
        &self,
        domain: &Domain,
        admin1: &str,
        mask: Option<SoilMask>,
    ) -> Result<Vec<SoilPoint>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use agro_common::ClimatologyStat;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, day).unwrap()
    }

    #[test]
    fn test_filter_for_member_key() {
        let filter = SliceFilter::for_key(&SliceKey::Member(d(5), 3));
        assert!(filter.matches(&SliceKey::Member(d(5), 3).tags()));
        assert!(!filter.matches(&SliceKey::Member(d(5), 4).tags()));
        assert!(!filter.matches(&SliceKey::Member(d(6), 3).tags()));
    }

    #[test]
    fn test_date_filter_rejects_undated_rows() {
        let filter = SliceFilter::all().dates(DateRange::new(d(1), d(31)).unwrap());
        assert!(!filter.matches(&SliceKey::Parameter("tav".into()).tags()));
        assert!(filter.matches(&SliceKey::Dated(d(31)).tags()));
    }

    #[test]
    fn test_climatology_filter() {
        let key = SliceKey::Climatology(ClimatologyStat::TmeanMean, 1);
        let filter = SliceFilter::for_key(&key);
        assert!(filter.matches(&key.tags()));
        assert!(!filter.matches(&SliceKey::Climatology(ClimatologyStat::TmeanMean, 2).tags()));
    }

    #[test]
    fn test_soil_mask() {
        let p = SoilPoint {
            lon: 0.0,
            lat: 0.0,
            mask1: false,
            mask2: true,
            profile: String::new(),
        };
        assert!(p.passes(None));
        assert!(!p.passes(Some(SoilMask::Primary)));
        assert!(p.passes(Some(SoilMask::Secondary)));
    }
}
