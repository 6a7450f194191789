//! End-to-end ingestion tests: directory source into the in-memory store.

use std::collections::BTreeSet;
use std::sync::Arc;

use agro_common::{Dataset, DateRange, GridTile, Variable};
use ingestion::{
    DirectorySource, ForecastField, ForecastIngester, IngestionError, ReanalysisIngester,
    SoilIngester, StaticIngester,
};
use raster_store::{
    Domain, MemoryStore, RasterStore, RasterTable, SliceKey, SoilMask, SpatialStore, StoreError,
};
use tempfile::TempDir;
use test_utils::{
    admin_features, assert_approx_eq, create_constant_tile, date, NORTH_POINT, TEST_DOMAIN,
};

struct Harness {
    memory: Arc<MemoryStore>,
    store: RasterStore,
    domain: Domain,
    source: Arc<DirectorySource>,
    _dir: TempDir,
}

async fn harness() -> Harness {
    let memory = Arc::new(MemoryStore::new());
    let store = RasterStore::new(memory.clone(), 10);
    let domain = Domain::new(TEST_DOMAIN).unwrap();
    store
        .schema
        .create_domain(&domain, &admin_features(), &[Dataset::Era5])
        .await
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(DirectorySource::new(dir.path()));
    Harness {
        memory,
        store,
        domain,
        source,
        _dir: dir,
    }
}

impl Harness {
    async fn put_observation(&self, dataset: Dataset, variable: Variable, day: chrono::NaiveDate, tile: &GridTile) {
        let path = self.source.observation_path(dataset, variable, day);
        self.source.put_tile(&path, tile).await.unwrap();
    }

    async fn put_forecast(&self, field: ForecastField, member: i32, day: chrono::NaiveDate, tile: &GridTile) {
        let path = self.source.forecast_path(field, member, day);
        self.source.put_tile(&path, tile).await.unwrap();
    }

    fn reanalysis(&self) -> ReanalysisIngester {
        ReanalysisIngester::new(self.store.clone(), self.source.clone(), 0.1)
    }
}

fn days(from: chrono::NaiveDate, to: chrono::NaiveDate) -> DateRange {
    DateRange::new(from, to).unwrap()
}

// ============================================================================
// Reanalysis
// ============================================================================

#[tokio::test]
async fn test_reanalysis_series_skips_missing_upstream_data() {
    let h = harness().await;
    let range = days(date(2023, 1, 1), date(2023, 1, 3));
    for day in range.days() {
        for variable in Variable::ALL {
            if variable == Variable::Rain && day == date(2023, 1, 2) {
                continue;
            }
            h.put_observation(Dataset::Era5, variable, day, &create_constant_tile(1.0)).await;
        }
    }

    let reports = h.reanalysis().ingest_series(&h.domain, Dataset::Era5, range).await.unwrap();

    assert_eq!(reports.len(), 3);
    assert!(reports[0].is_complete());
    assert_eq!(reports[1].skipped, vec![Variable::Rain]);
    let rain = RasterTable::Series(Dataset::Era5, Variable::Rain);
    let missing = h.store.continuity.missing_dates(&h.domain, &rain, range).await.unwrap();
    assert_eq!(missing, BTreeSet::from([date(2023, 1, 2)]));
    let tmax = RasterTable::Series(Dataset::Era5, Variable::Tmax);
    assert!(h.store.continuity.missing_dates(&h.domain, &tmax, range).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reanalysis_rerun_overwrites() {
    let h = harness().await;
    let day = date(2023, 1, 1);
    for variable in Variable::ALL {
        h.put_observation(Dataset::Era5, variable, day, &create_constant_tile(1.0)).await;
    }
    h.reanalysis().ingest_record(&h.domain, Dataset::Era5, day).await.unwrap();
    h.put_observation(Dataset::Era5, Variable::Rain, day, &create_constant_tile(7.0)).await;
    h.reanalysis().ingest_record(&h.domain, Dataset::Era5, day).await.unwrap();

    let rows = h.memory.rows(&h.domain, &RasterTable::Series(Dataset::Era5, Variable::Rain)).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1.data[0], 7.0);
}

#[tokio::test]
async fn test_reanalysis_requires_onboarded_domain() {
    let memory = Arc::new(MemoryStore::new());
    let store = RasterStore::new(memory, 10);
    let dir = tempfile::tempdir().unwrap();
    let ingester = ReanalysisIngester::new(store, Arc::new(DirectorySource::new(dir.path())), 0.1);

    let err = ingester
        .ingest_record(&Domain::new("elsewhere").unwrap(), Dataset::Era5, date(2023, 1, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestionError::Store(StoreError::MissingTable { ref table, .. }) if table == "admin"));
}

#[tokio::test]
async fn test_prism_borrows_radiation_only_on_complete_days() {
    let h = harness().await;
    let (day1, day2) = (date(2023, 7, 1), date(2023, 7, 2));
    for day in [day1, day2] {
        h.put_observation(Dataset::Era5, Variable::Srad, day, &create_constant_tile(2.0e7)).await;
        h.put_observation(Dataset::Prism, Variable::Tmax, day, &create_constant_tile(30.0)).await;
        h.put_observation(Dataset::Prism, Variable::Tmin, day, &create_constant_tile(18.0)).await;
    }
    h.put_observation(Dataset::Prism, Variable::Rain, day1, &create_constant_tile(3.0)).await;

    let reports = h
        .reanalysis()
        .ingest_series(&h.domain, Dataset::Prism, days(day1, day2))
        .await
        .unwrap();
    assert!(reports[0].ingested.contains(&Variable::Srad));
    assert!(reports[1].skipped.contains(&Variable::Srad));

    let srad = RasterTable::Series(Dataset::Prism, Variable::Srad);
    let stored = h
        .memory
        .distinct_dates(&h.domain, &srad, &raster_store::SliceFilter::all())
        .await
        .unwrap();
    assert_eq!(stored, BTreeSet::from([day1]));
}

#[tokio::test]
async fn test_forecast_dataset_is_not_reanalysis() {
    let h = harness().await;
    let err = h
        .reanalysis()
        .ingest_record(&h.domain, Dataset::Nmme, date(2023, 1, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestionError::UnsupportedDataset { .. }));
}

// ============================================================================
// Forecast
// ============================================================================

/// Climatology with tmax 300K and tmin 290K in every month.
async fn seed_climatology(h: &Harness) {
    for month in 1..=12 {
        let day = date(2020, month, 10);
        for (variable, value) in [(Variable::Tmax, 300.0), (Variable::Tmin, 290.0)] {
            h.store
                .staging
                .ingest_slice(
                    &h.domain,
                    &RasterTable::Series(Dataset::Era5, variable),
                    &create_constant_tile(value),
                    &SliceKey::Dated(day),
                )
                .await
                .unwrap();
        }
    }
    h.store
        .climatology
        .build(&h.domain, Dataset::Era5, &[Variable::Tmax, Variable::Tmin])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_forecast_bias_correction_and_members() {
    let h = harness().await;
    seed_climatology(&h).await;
    let (day1, day2) = (date(2024, 3, 1), date(2024, 3, 2));
    h.put_forecast(ForecastField::Temperature, 1, day1, &create_constant_tile(290.0)).await;
    h.put_forecast(ForecastField::Temperature, 1, day2, &create_constant_tile(292.0)).await;
    h.put_forecast(ForecastField::Precipitation, 1, day1, &create_constant_tile(5.0)).await;
    h.put_forecast(ForecastField::Precipitation, 1, day2, &create_constant_tile(0.0)).await;

    let ingester = ForecastIngester::new(h.store.clone(), h.source.clone(), Dataset::Era5, 1.0);
    let reports = ingester.ingest_forecast(&h.domain, 1..=2).await.unwrap();

    assert_eq!(reports[0].temperature_days, 2);
    assert_eq!(reports[0].rain_days, 2);
    assert_eq!(reports[1].temperature_days, 0);
    assert_eq!(reports[1].rain_days, 0);

    let tmax = RasterTable::Series(Dataset::Nmme, Variable::Tmax);
    assert_eq!(h.memory.ensemble_members(&h.domain, &tmax).await.unwrap(), vec![1]);

    let series = h
        .store
        .extract
        .series_for_point(
            &h.domain,
            Dataset::Nmme,
            NORTH_POINT.0,
            NORTH_POINT.1,
            days(day1, day2),
            &[Variable::Tmax, Variable::Tmin, Variable::Rain],
            Some(1),
        )
        .await
        .unwrap();
    // monthly forecast mean 291K against 295K climatology: bias +4K, range 10K
    let tmin = series.column(Variable::Tmin).unwrap();
    let tmax = series.column(Variable::Tmax).unwrap();
    assert_approx_eq!(tmin[0], 289.0, 1e-9);
    assert_approx_eq!(tmax[0], 299.0, 1e-9);
    assert_approx_eq!(tmin[1], 291.0, 1e-9);
    assert_approx_eq!(tmax[1], 301.0, 1e-9);
    assert_eq!(series.column(Variable::Rain).unwrap(), &[5.0, 0.0]);
}

#[tokio::test]
async fn test_forecast_requires_climatology() {
    let h = harness().await;
    h.put_forecast(ForecastField::Precipitation, 1, date(2024, 3, 1), &create_constant_tile(5.0)).await;
    let ingester = ForecastIngester::new(h.store.clone(), h.source.clone(), Dataset::Era5, 1.0);

    let err = ingester.ingest_member_rain(&h.domain, 1).await.unwrap_err();
    assert!(matches!(err, IngestionError::Store(StoreError::MissingTable { ref table, .. }) if table == "era5_clim"));
}

// ============================================================================
// Soil and static parameters
// ============================================================================

const SOIL_FILE: &str = "\
*SOILS: General DSSAT Soil Input File

*TL00000001  WISE        SCL     140 North profile
@SITE        COUNTRY          LAT     LONG SCS FAMILY
 -99         TL            -0.375   30.625 Loam
*TL00000002  WISE        SCL     140 Second north profile
@SITE        COUNTRY          LAT     LONG SCS FAMILY
 -99         TL            -0.125   31.875 Loam
*TL00000003  WISE        SCL     140 South profile
@SITE        COUNTRY          LAT     LONG SCS FAMILY
 -99         TL            -1.625   31.375 Clay
";

#[tokio::test]
async fn test_soil_ingestion_with_masks() {
    let h = harness().await;
    let ingester = SoilIngester::new(h.store.clone());
    // primary mask covers only the western half of the grid
    let mut mask1 = create_constant_tile(0.0);
    for row in 0..mask1.height {
        for col in 0..mask1.width / 2 {
            mask1.data[row * mask1.width + col] = 1.0;
        }
    }

    let inserted = ingester.ingest_soil(&h.domain, SOIL_FILE, Some(&mask1), None).await.unwrap();
    assert_eq!(inserted, 3);

    let north = h.memory.soils(&h.domain, "north", None).await.unwrap();
    assert_eq!(north.len(), 2);
    let masked = h.memory.soils(&h.domain, "north", Some(SoilMask::Primary)).await.unwrap();
    assert_eq!(masked.len(), 1);
    assert!(masked[0].profile.starts_with("*TL00000001"));
    let secondary = h.memory.soils(&h.domain, "south", Some(SoilMask::Secondary)).await.unwrap();
    assert_eq!(secondary.len(), 1);
}

#[tokio::test]
async fn test_soil_file_twice_is_rejected() {
    let h = harness().await;
    let ingester = SoilIngester::new(h.store.clone());
    ingester.ingest_soil(&h.domain, SOIL_FILE, None, None).await.unwrap();

    let err = ingester.ingest_soil(&h.domain, SOIL_FILE, None, None).await.unwrap_err();
    assert!(matches!(err, IngestionError::Store(StoreError::DuplicateSoilPoint { .. })));
    assert_eq!(h.memory.soils(&h.domain, "north", None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_static_parameter_round_trip() {
    let h = harness().await;
    let ingester = StaticIngester::new(h.store.clone());
    ingester.ingest_static(&h.domain, &create_constant_tile(24.0), "tav").await.unwrap();

    let err = ingester
        .ingest_static(&h.domain, &create_constant_tile(0.0), "tav")
        .await
        .unwrap_err();
    assert!(matches!(err, IngestionError::Store(StoreError::ParameterExists { .. })));

    let long_name = "x".repeat(33);
    let err = ingester
        .ingest_static(&h.domain, &create_constant_tile(0.0), &long_name)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestionError::Store(StoreError::InvalidParameterName(_))));

    let value = h
        .store
        .extract
        .static_value(&h.domain, NORTH_POINT.0, NORTH_POINT.1, "tav")
        .await
        .unwrap();
    assert_eq!(value, Some(24.0));
}
