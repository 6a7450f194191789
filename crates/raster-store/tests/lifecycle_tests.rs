//! Store lifecycle tests against the in-memory gateway.

use std::collections::BTreeSet;
use std::sync::Arc;

use agro_common::{AdminFeature, ClimatologyStat, Dataset, DateRange, Polygon, Variable};
use raster_store::{
    Domain, MemoryStore, RasterStore, RasterTable, SliceFilter, SliceKey, SoilMask, SoilPoint,
    SpatialStore, StoreError,
};
use test_utils::{
    admin_features, assert_approx_eq, create_constant_tile, create_temperature_tile, date,
    domain_bbox, NORTH_POINT, SOUTH_POINT, TEST_DOMAIN,
};

async fn setup() -> (Arc<MemoryStore>, RasterStore, Domain) {
    let memory = Arc::new(MemoryStore::new());
    let store = RasterStore::new(memory.clone(), 10);
    let domain = Domain::new(TEST_DOMAIN).unwrap();
    store
        .schema
        .create_domain(&domain, &admin_features(), &[Dataset::Era5])
        .await
        .unwrap();
    (memory, store, domain)
}

fn era5(variable: Variable) -> RasterTable {
    RasterTable::Series(Dataset::Era5, variable)
}

fn range(from: (i32, u32, u32), to: (i32, u32, u32)) -> DateRange {
    DateRange::new(date(from.0, from.1, from.2), date(to.0, to.1, to.2)).unwrap()
}

async fn ingest_days(store: &RasterStore, domain: &Domain, table: RasterTable, days: DateRange, value: f64) {
    for day in days.days() {
        store
            .staging
            .ingest_slice(domain, &table, &create_constant_tile(value), &SliceKey::Dated(day))
            .await
            .unwrap();
    }
}

// ============================================================================
// Schema manager
// ============================================================================

#[tokio::test]
async fn test_create_domain_builds_table_set() {
    let (memory, _store, domain) = setup().await;

    for variable in Variable::ALL {
        assert!(memory.table_exists(&domain, &era5(variable).name()).await.unwrap());
    }
    assert!(memory.table_exists(&domain, "soil").await.unwrap());
    assert!(memory.table_exists(&domain, "cultivar_options").await.unwrap());
    assert!(memory.table_exists(&domain, "admin").await.unwrap());
    assert!(!memory.table_exists(&domain, "nmme_tmax").await.unwrap());
}

#[tokio::test]
async fn test_create_domain_again_keeps_existing_series() {
    let (memory, store, domain) = setup().await;
    let day = range((2023, 1, 1), (2023, 1, 1));
    ingest_days(&store, &domain, era5(Variable::Rain), day, 3.0).await;

    let smaller = vec![admin_features().remove(0)];
    store
        .schema
        .create_domain(&domain, &smaller, &[Dataset::Era5])
        .await
        .unwrap();

    assert_eq!(memory.rows(&domain, &era5(Variable::Rain)).await.len(), 1);
    assert!(matches!(
        store.schema.check_admin1(&domain, "south").await,
        Err(StoreError::AdminUnit { count: 0, .. })
    ));
}

#[tokio::test]
async fn test_envelope_is_padded() {
    let (_memory, store, domain) = setup().await;
    let bbox = store.schema.envelope(&domain, 0.1).await.unwrap();
    let expected = domain_bbox().expand(0.1);
    assert_approx_eq!(bbox.min_x, expected.min_x, 1e-12);
    assert_approx_eq!(bbox.max_y, expected.max_y, 1e-12);
}

#[tokio::test]
async fn test_check_admin1() {
    let (_memory, store, domain) = setup().await;
    assert!(store.schema.check_admin1(&domain, "north").await.is_ok());
    assert!(matches!(
        store.schema.check_admin1(&domain, "east").await,
        Err(StoreError::AdminUnit { count: 0, .. })
    ));

    let mut features = admin_features();
    features.push(AdminFeature::new(
        "north",
        Polygon::from_bbox(&agro_common::BoundingBox::new(40.0, 0.0, 41.0, 1.0)),
    ));
    store
        .schema
        .create_domain(&domain, &features, &[])
        .await
        .unwrap();
    assert!(matches!(
        store.schema.check_admin1(&domain, "north").await,
        Err(StoreError::AdminUnit { count: 2, .. })
    ));
}

#[tokio::test]
async fn test_ensure_table_is_idempotent() {
    let (_memory, store, domain) = setup().await;
    let table = RasterTable::Series(Dataset::Nmme, Variable::Tmax);
    assert!(store.schema.ensure_table(&domain, table).await.unwrap());
    assert!(!store.schema.ensure_table(&domain, table).await.unwrap());
}

#[tokio::test]
async fn test_ensure_table_requires_domain() {
    let memory = Arc::new(MemoryStore::new());
    let store = RasterStore::new(memory, 10);
    let domain = Domain::new("nowhere").unwrap();
    assert!(matches!(
        store.schema.ensure_table(&domain, era5(Variable::Rain)).await,
        Err(StoreError::MissingDomain(_))
    ));
}

// ============================================================================
// Staged ingestion
// ============================================================================

#[tokio::test]
async fn test_reingestion_replaces_slice() {
    let (memory, store, domain) = setup().await;
    let table = era5(Variable::Tmax);
    let day = date(2023, 1, 1);

    store
        .staging
        .ingest_slice(&domain, &table, &create_constant_tile(300.0), &SliceKey::Dated(day))
        .await
        .unwrap();
    let outcome = store
        .staging
        .ingest_slice(&domain, &table, &create_constant_tile(305.0), &SliceKey::Dated(day))
        .await
        .unwrap();

    assert_eq!(outcome.replaced, 1);
    let rows = memory.rows(&domain, &table).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1, create_constant_tile(305.0));
    assert_eq!(
        memory
            .count_slices(&domain, &table, &SliceFilter::all())
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_member_keys_coexist_per_date() {
    let (memory, store, domain) = setup().await;
    let table = RasterTable::Series(Dataset::Nmme, Variable::Rain);
    store.schema.ensure_table(&domain, table).await.unwrap();
    let day = date(2023, 2, 1);

    for ens in 1..=3 {
        store
            .staging
            .ingest_slice(&domain, &table, &create_constant_tile(ens as f64), &SliceKey::Member(day, ens))
            .await
            .unwrap();
    }
    store
        .staging
        .ingest_slice(&domain, &table, &create_constant_tile(9.0), &SliceKey::Member(day, 2))
        .await
        .unwrap();

    assert_eq!(memory.ensemble_members(&domain, &table).await.unwrap(), vec![1, 2, 3]);
    assert_eq!(memory.rows(&domain, &table).await.len(), 3);
}

#[tokio::test]
async fn test_staging_is_dropped_on_failure() {
    let (memory, store, domain) = setup().await;
    let table = era5(Variable::Rain);
    let day = date(2023, 1, 1);
    store
        .staging
        .ingest_slice(&domain, &table, &create_constant_tile(1.0), &SliceKey::Dated(day))
        .await
        .unwrap();

    memory.inject_merge_failure(true);
    let err = store
        .staging
        .ingest_slice(&domain, &table, &create_constant_tile(2.0), &SliceKey::Dated(day))
        .await
        .unwrap_err();
    memory.inject_merge_failure(false);

    assert!(matches!(err, StoreError::StagingFailed(_)));
    assert!(memory.staging_relations().await.is_empty());
    // delete and insert share a transaction, so the old slice survives
    let rows = memory.rows(&domain, &table).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1, create_constant_tile(1.0));
}

#[tokio::test]
async fn test_staging_is_dropped_on_success() {
    let (memory, store, domain) = setup().await;
    ingest_days(&store, &domain, era5(Variable::Rain), range((2023, 1, 1), (2023, 1, 3)), 1.0).await;
    assert!(memory.staging_relations().await.is_empty());
}

#[tokio::test]
async fn test_key_must_match_table_kind() {
    let (_memory, store, domain) = setup().await;
    let err = store
        .staging
        .ingest_slice(
            &domain,
            &era5(Variable::Rain),
            &create_constant_tile(1.0),
            &SliceKey::Parameter("tav".into()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::KeyMismatch { .. }));
}

#[tokio::test]
async fn test_ingest_into_missing_table_fails() {
    let (_memory, store, domain) = setup().await;
    let err = store
        .staging
        .ingest_slice(
            &domain,
            &RasterTable::Series(Dataset::Nmme, Variable::Rain),
            &create_constant_tile(1.0),
            &SliceKey::Member(date(2023, 1, 1), 1),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::MissingTable { .. }));
}

// ============================================================================
// Static parameters
// ============================================================================

#[tokio::test]
async fn test_static_parameter_is_never_overwritten() {
    let (_memory, store, domain) = setup().await;
    store.schema.ensure_table(&domain, RasterTable::Static).await.unwrap();
    let key = SliceKey::Parameter("tav".into());

    store
        .staging
        .ingest_slice(&domain, &RasterTable::Static, &create_constant_tile(21.5), &key)
        .await
        .unwrap();
    let err = store
        .staging
        .ingest_slice(&domain, &RasterTable::Static, &create_constant_tile(99.0), &key)
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::ParameterExists { ref name, .. } if name == "tav"));
    let value = store
        .extract
        .static_value(&domain, NORTH_POINT.0, NORTH_POINT.1, "tav")
        .await
        .unwrap();
    assert_eq!(value, Some(21.5));
}

// ============================================================================
// Continuity
// ============================================================================

#[tokio::test]
async fn test_missing_dates() {
    let (memory, store, domain) = setup().await;
    let table = era5(Variable::Tmin);
    let days = range((2023, 1, 1), (2023, 1, 10));
    ingest_days(&store, &domain, table, days, 290.0).await;

    assert!(store.continuity.missing_dates(&domain, &table, days).await.unwrap().is_empty());

    let removed = date(2023, 1, 5);
    memory
        .delete_slices(&domain, &table, &SliceFilter::for_key(&SliceKey::Dated(removed)))
        .await
        .unwrap();
    let missing = store.continuity.missing_dates(&domain, &table, days).await.unwrap();
    assert_eq!(missing, BTreeSet::from([removed]));

    assert_eq!(
        store.continuity.latest_date(&domain, &table).await.unwrap(),
        Some(date(2023, 1, 10))
    );
}

#[tokio::test]
async fn test_missing_dates_beyond_record() {
    let (_memory, store, domain) = setup().await;
    let table = era5(Variable::Tmin);
    ingest_days(&store, &domain, table, range((2023, 1, 1), (2023, 1, 3)), 290.0).await;

    let missing = store
        .continuity
        .missing_dates(&domain, &table, range((2023, 1, 2), (2023, 1, 5)))
        .await
        .unwrap();
    assert_eq!(missing, BTreeSet::from([date(2023, 1, 4), date(2023, 1, 5)]));
}

// ============================================================================
// Point extraction
// ============================================================================

#[tokio::test]
async fn test_extraction_aligns_four_variables_over_january() {
    let (_memory, store, domain) = setup().await;
    let january = range((2023, 1, 1), (2023, 1, 31));
    let values = [
        (Variable::Tmax, 301.0),
        (Variable::Tmin, 289.0),
        (Variable::Rain, 4.0),
        (Variable::Srad, 2.0e7),
    ];
    for (variable, value) in values {
        ingest_days(&store, &domain, era5(variable), january, value).await;
        assert!(store
            .continuity
            .missing_dates(&domain, &era5(variable), january)
            .await
            .unwrap()
            .is_empty());
    }

    let series = store
        .extract
        .series_for_point(
            &domain,
            Dataset::Era5,
            NORTH_POINT.0,
            NORTH_POINT.1,
            january,
            &Variable::ALL,
            None,
        )
        .await
        .unwrap();

    assert_eq!(series.len(), 31);
    assert_eq!(series.variables().count(), 4);
    assert_eq!(series.first_date(), Some(date(2023, 1, 1)));
    assert_eq!(series.last_date(), Some(date(2023, 1, 31)));
    assert!(series.dates().windows(2).all(|w| w[0] < w[1]));
    for (variable, value) in values {
        assert!(series.column(variable).unwrap().iter().all(|v| *v == value));
    }
}

#[tokio::test]
async fn test_extraction_fails_on_gap_before_sampling() {
    let (_memory, store, domain) = setup().await;
    let days = range((2023, 1, 1), (2023, 1, 5));
    ingest_days(&store, &domain, era5(Variable::Tmax), days, 300.0).await;
    ingest_days(&store, &domain, era5(Variable::Tmin), range((2023, 1, 1), (2023, 1, 4)), 290.0).await;

    let err = store
        .extract
        .series_for_point(
            &domain,
            Dataset::Era5,
            NORTH_POINT.0,
            NORTH_POINT.1,
            days,
            &[Variable::Tmax, Variable::Tmin],
            None,
        )
        .await
        .unwrap_err();
    match err {
        StoreError::IncompleteSeries { table, missing, .. } => {
            assert_eq!(table, "era5_tmin");
            assert_eq!(missing, vec![date(2023, 1, 5)]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_extraction_fails_on_null_cell() {
    let (_memory, store, domain) = setup().await;
    let days = range((2023, 1, 1), (2023, 1, 2));
    let table = era5(Variable::Rain);
    ingest_days(&store, &domain, table, range((2023, 1, 1), (2023, 1, 1)), 1.0).await;
    // (2, 1) is the cell holding NORTH_POINT
    store
        .staging
        .ingest_slice(
            &domain,
            &table,
            &test_utils::create_tile_with_nodata(1.0, &[(2, 1)]),
            &SliceKey::Dated(date(2023, 1, 2)),
        )
        .await
        .unwrap();

    let err = store
        .extract
        .series_for_point(&domain, Dataset::Era5, NORTH_POINT.0, NORTH_POINT.1, days, &[Variable::Rain], None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NullValues { ref dates, .. } if dates == &vec![date(2023, 1, 2)]));
    assert!(err.is_point_data_error());
}

#[tokio::test]
async fn test_extraction_outside_grid_has_no_coverage() {
    let (_memory, store, domain) = setup().await;
    let days = range((2023, 1, 1), (2023, 1, 1));
    ingest_days(&store, &domain, era5(Variable::Rain), days, 1.0).await;

    let err = store
        .extract
        .series_for_point(&domain, Dataset::Era5, 50.0, 10.0, days, &[Variable::Rain], None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NoCoverage { .. }));
}

#[tokio::test]
async fn test_prism_temperatures_come_back_in_kelvin() {
    let (_memory, store, domain) = setup().await;
    let table = RasterTable::Series(Dataset::Prism, Variable::Tmax);
    store.schema.ensure_table(&domain, table).await.unwrap();
    let days = range((2023, 6, 1), (2023, 6, 2));
    ingest_days(&store, &domain, table, days, 25.0).await;

    let series = store
        .extract
        .series_for_point(&domain, Dataset::Prism, SOUTH_POINT.0, SOUTH_POINT.1, days, &[Variable::Tmax], None)
        .await
        .unwrap();
    assert_approx_eq!(series.column(Variable::Tmax).unwrap()[0], 298.15, 1e-9);
}

// ============================================================================
// Climatology
// ============================================================================

/// Two days per month of 2022: tmax 300+m on the 1st and 302+m on the 15th,
/// tmin 290+m on both.
async fn seed_climatology_year(store: &RasterStore, domain: &Domain) {
    for month in 1..=12u32 {
        for (day, extra) in [(1, 0.0), (15, 2.0)] {
            let d = date(2022, month, day);
            let m = month as f64;
            for (variable, value) in [
                (Variable::Tmax, 300.0 + m + extra),
                (Variable::Tmin, 290.0 + m),
                (Variable::Rain, 2.0),
                (Variable::Srad, 1.5e7),
            ] {
                store
                    .staging
                    .ingest_slice(domain, &era5(variable), &create_constant_tile(value), &SliceKey::Dated(d))
                    .await
                    .unwrap();
            }
        }
    }
}

#[tokio::test]
async fn test_climatology_statistics() {
    let (_memory, store, domain) = setup().await;
    seed_climatology_year(&store, &domain).await;

    let rows = store
        .climatology
        .build(&domain, Dataset::Era5, &Variable::ALL)
        .await
        .unwrap();
    assert_eq!(rows, 12 * 8);

    let (lon, lat) = NORTH_POINT;
    let value = |stat: ClimatologyStat, month: u32| {
        let store = store.clone();
        let domain = domain.clone();
        async move {
            store
                .climatology
                .grid(&domain, Dataset::Era5, stat, month)
                .await
                .unwrap()
                .value_at(lon, lat)
                .unwrap()
        }
    };

    assert_approx_eq!(value(ClimatologyStat::Mean(Variable::Tmax), 3).await, 304.0, 1e-9);
    assert_approx_eq!(value(ClimatologyStat::Mean(Variable::Tmin), 3).await, 293.0, 1e-9);
    assert_approx_eq!(value(ClimatologyStat::TmeanMean, 3).await, 298.5, 1e-9);
    assert_approx_eq!(value(ClimatologyStat::TmeanRange, 3).await, 1.0, 1e-9);
    assert_approx_eq!(value(ClimatologyStat::TrangeMean, 3).await, 11.0, 1e-9);
    assert_approx_eq!(value(ClimatologyStat::TrangeRange, 3).await, 2.0, 1e-9);
}

#[tokio::test]
async fn test_climatology_requires_explicit_drop_and_is_deterministic() {
    let (_memory, store, domain) = setup().await;
    seed_climatology_year(&store, &domain).await;
    let clim = &store.climatology;

    clim.build(&domain, Dataset::Era5, &Variable::ALL).await.unwrap();
    let mut first = Vec::new();
    for month in 1..=12 {
        first.push(clim.grid(&domain, Dataset::Era5, ClimatologyStat::TrangeMean, month).await.unwrap());
    }

    assert!(matches!(
        clim.build(&domain, Dataset::Era5, &Variable::ALL).await,
        Err(StoreError::TableExists { .. })
    ));

    clim.drop(&domain, Dataset::Era5).await.unwrap();
    clim.build(&domain, Dataset::Era5, &Variable::ALL).await.unwrap();
    for month in 1..=12 {
        let again = clim.grid(&domain, Dataset::Era5, ClimatologyStat::TrangeMean, month).await.unwrap();
        assert_eq!(again, first[month as usize - 1]);
    }
}

#[tokio::test]
async fn test_climatology_with_empty_month_writes_nothing() {
    let (memory, store, domain) = setup().await;
    let january = range((2022, 1, 1), (2022, 1, 3));
    ingest_days(&store, &domain, era5(Variable::Rain), january, 1.0).await;

    let err = store
        .climatology
        .build(&domain, Dataset::Era5, &[Variable::Rain])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::EmptyAggregate { .. }));
    assert!(!memory.table_exists(&domain, "era5_clim").await.unwrap());
}

// ============================================================================
// Soil and sampling support
// ============================================================================

fn soil(lon: f64, lat: f64, mask1: bool) -> SoilPoint {
    SoilPoint {
        lon,
        lat,
        mask1,
        mask2: true,
        profile: format!("*TEST{:06}", (lon * 1000.0) as i64),
    }
}

#[tokio::test]
async fn test_soil_points_are_unique_and_filtered() {
    let (memory, _store, domain) = setup().await;
    let points = vec![
        soil(NORTH_POINT.0, NORTH_POINT.1, true),
        soil(30.1, -0.1, false),
        soil(SOUTH_POINT.0, SOUTH_POINT.1, true),
    ];
    assert_eq!(memory.insert_soils(&domain, &points).await.unwrap(), 3);

    let err = memory
        .insert_soils(&domain, &[soil(31.9, -0.9, true), soil(30.1, -0.1, true)])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateSoilPoint { .. }));

    let north = memory.soils(&domain, "north", None).await.unwrap();
    assert_eq!(north.len(), 2);
    let masked = memory.soils(&domain, "north", Some(SoilMask::Primary)).await.unwrap();
    assert_eq!(masked.len(), 1);
    assert_eq!(masked[0].lon, NORTH_POINT.0);
}

#[tokio::test]
async fn test_pixel_centroids_clip_to_unit() {
    let (memory, store, domain) = setup().await;
    let day = date(2023, 1, 1);
    store
        .staging
        .ingest_slice(&domain, &era5(Variable::Rain), &create_temperature_tile(280.0), &SliceKey::Dated(day))
        .await
        .unwrap();

    let centroids = memory
        .pixel_centroids(&domain, &era5(Variable::Rain), day, "north")
        .await
        .unwrap();
    assert_eq!(centroids.len(), 32);
    assert!(centroids.iter().all(|(_, y)| *y > -1.0));
}
