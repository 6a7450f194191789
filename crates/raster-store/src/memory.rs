//! In-memory implementation of the gateway.
//!
//! Keeps one row per staged tile and requires every tile combined by an
//! aggregate to share a grid. Used by tests and dry runs.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use agro_common::{AdminFeature, BoundingBox, GridTile, MultiPolygon};

use crate::error::{Result, StoreError};
use crate::gateway::{
    AggregateRequest, MergeOutcome, PointSample, SliceFilter, SoilMask, SoilPoint,
    SpatialStore, StagingRelation,
};
use crate::tables::{
    Domain, RasterTable, SliceKey, SliceTags, TableDescriptor, TableKind, ADMIN_TABLE,
    BBOX_VIEW, SOIL_TABLE,
};

#[derive(Debug, Clone)]
struct StoredRow {
    tile: GridTile,
    tags: SliceTags,
}

#[derive(Debug, Default)]
struct Namespace {
    tables: HashMap<String, TableKind>,
    rasters: HashMap<String, Vec<StoredRow>>,
    admin: Vec<AdminFeature>,
    envelope: Option<Option<BoundingBox>>,
    soils: Vec<SoilPoint>,
}

#[derive(Debug, Default)]
struct StagedRows {
    tiles: Vec<GridTile>,
    tags: Option<SliceTags>,
}

#[derive(Debug, Default)]
struct MemoryState {
    namespaces: HashMap<Domain, Namespace>,
    staging: HashMap<String, StagedRows>,
}

/// Gateway holding everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    fail_merge: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following merge fail before touching the permanent table.
    pub fn inject_merge_failure(&self, fail: bool) {
        self.fail_merge.store(fail, Ordering::SeqCst);
    }

    /// Names of staging relations that currently exist.
    pub async fn staging_relations(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut names: Vec<String> = state.staging.keys().cloned().collect();
        names.sort();
        names
    }

    /// Stored rows of a raster table as (tags, tile) pairs, in insertion order.
    pub async fn rows(&self, domain: &Domain, table: &RasterTable) -> Vec<(SliceTags, GridTile)> {
        let state = self.state.read().await;
        state
            .namespaces
            .get(domain)
            .and_then(|ns| ns.rasters.get(&table.name()))
            .map(|rows| rows.iter().map(|r| (r.tags.clone(), r.tile.clone())).collect())
            .unwrap_or_default()
    }
}

impl MemoryState {
    fn namespace(&self, domain: &Domain) -> Result<&Namespace> {
        self.namespaces
            .get(domain)
            .ok_or_else(|| StoreError::MissingDomain(domain.to_string()))
    }

    fn namespace_mut(&mut self, domain: &Domain) -> Result<&mut Namespace> {
        self.namespaces
            .get_mut(domain)
            .ok_or_else(|| StoreError::MissingDomain(domain.to_string()))
    }

    fn rows(&self, domain: &Domain, table: &str) -> Result<&Vec<StoredRow>> {
        self.namespace(domain)?
            .rasters
            .get(table)
            .ok_or_else(|| StoreError::missing_table(domain.as_str(), table))
    }

    fn require_table(&self, domain: &Domain, table: &str) -> Result<()> {
        if self.namespace(domain)?.tables.contains_key(table) {
            Ok(())
        } else {
            Err(StoreError::missing_table(domain.as_str(), table))
        }
    }
}

fn boundary_envelope(features: &[AdminFeature]) -> Option<BoundingBox> {
    features
        .iter()
        .filter_map(|f| f.geometry.envelope())
        .reduce(|a, b| a.union(&b))
}

#[async_trait]
impl SpatialStore for MemoryStore {
    async fn create_namespace(&self, domain: &Domain) -> Result<()> {
        let mut state = self.state.write().await;
        state.namespaces.entry(domain.clone()).or_default();
        Ok(())
    }

    async fn namespace_exists(&self, domain: &Domain) -> Result<bool> {
        Ok(self.state.read().await.namespaces.contains_key(domain))
    }

    async fn table_exists(&self, domain: &Domain, table: &str) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.namespaces.get(domain).is_some_and(|ns| {
            ns.tables.contains_key(table) || (table == BBOX_VIEW && ns.envelope.is_some())
        }))
    }

    async fn create_table(
        &self,
        domain: &Domain,
        table: &str,
        descriptor: &'static TableDescriptor,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let ns = state.namespace_mut(domain)?;
        if ns.tables.contains_key(table) {
            return Err(StoreError::TableExists {
                domain: domain.to_string(),
                table: table.to_string(),
            });
        }
        ns.tables.insert(table.to_string(), descriptor.kind);
        if matches!(
            descriptor.kind,
            TableKind::Reanalysis | TableKind::Forecast | TableKind::Static | TableKind::Climatology
        ) {
            ns.rasters.insert(table.to_string(), Vec::new());
        }
        Ok(())
    }

    async fn drop_table(&self, domain: &Domain, table: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let ns = state.namespace_mut(domain)?;
        ns.tables.remove(table);
        ns.rasters.remove(table);
        if table == ADMIN_TABLE {
            ns.admin.clear();
            ns.envelope = None;
        }
        if table == SOIL_TABLE {
            ns.soils.clear();
        }
        Ok(())
    }

    async fn replace_boundary(&self, domain: &Domain, features: &[AdminFeature]) -> Result<()> {
        let mut state = self.state.write().await;
        let ns = state.namespace_mut(domain)?;
        ns.tables.insert(ADMIN_TABLE.to_string(), TableKind::Admin);
        ns.admin = features.to_vec();
        // the envelope view depends on admin and goes with it
        ns.envelope = None;
        Ok(())
    }

    async fn refresh_envelope(&self, domain: &Domain) -> Result<()> {
        let mut state = self.state.write().await;
        state.require_table(domain, ADMIN_TABLE)?;
        let ns = state.namespace_mut(domain)?;
        ns.envelope = Some(boundary_envelope(&ns.admin));
        Ok(())
    }

    async fn envelope(&self, domain: &Domain) -> Result<Option<BoundingBox>> {
        let state = self.state.read().await;
        Ok(state.namespace(domain)?.envelope.flatten())
    }

    async fn admin_geometries(&self, domain: &Domain, admin1: &str) -> Result<Vec<MultiPolygon>> {
        let state = self.state.read().await;
        state.require_table(domain, ADMIN_TABLE)?;
        Ok(state
            .namespace(domain)?
            .admin
            .iter()
            .filter(|f| f.admin1 == admin1)
            .map(|f| f.geometry.clone())
            .collect())
    }

    async fn load_staging(
        &self,
        staging: &StagingRelation,
        tile: &GridTile,
        _tile_size: usize,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if state.staging.contains_key(&staging.name) {
            return Err(StoreError::StagingFailed(format!(
                "relation {} already exists",
                staging.name
            )));
        }
        state.staging.insert(
            staging.name.clone(),
            StagedRows {
                tiles: vec![tile.clone()],
                tags: None,
            },
        );
        Ok(())
    }

    async fn tag_staging(&self, staging: &StagingRelation, key: &SliceKey) -> Result<()> {
        let mut state = self.state.write().await;
        let staged = state
            .staging
            .get_mut(&staging.name)
            .ok_or_else(|| StoreError::StagingFailed(format!("no relation {}", staging.name)))?;
        staged.tags = Some(key.tags());
        Ok(())
    }

    async fn merge_staging(
        &self,
        staging: &StagingRelation,
        domain: &Domain,
        table: &RasterTable,
        replace: Option<&SliceFilter>,
    ) -> Result<MergeOutcome> {
        let mut state = self.state.write().await;
        if self.fail_merge.load(Ordering::SeqCst) {
            return Err(StoreError::StagingFailed(format!(
                "injected failure merging {} into {}",
                staging.name, table
            )));
        }

        let staged = state
            .staging
            .get(&staging.name)
            .ok_or_else(|| StoreError::StagingFailed(format!("no relation {}", staging.name)))?;
        let tags = staged
            .tags
            .clone()
            .ok_or_else(|| StoreError::StagingFailed(format!("{} was never tagged", staging.name)))?;
        let new_rows: Vec<StoredRow> = staged
            .tiles
            .iter()
            .map(|tile| StoredRow {
                tile: tile.clone(),
                tags: tags.clone(),
            })
            .collect();

        let rows = state
            .namespace_mut(domain)?
            .rasters
            .get_mut(&table.name())
            .ok_or_else(|| StoreError::missing_table(domain.as_str(), table.name()))?;

        let mut outcome = MergeOutcome::default();
        if let Some(filter) = replace {
            let before = rows.len();
            rows.retain(|r| !filter.matches(&r.tags));
            outcome.replaced = (before - rows.len()) as u64;
        }
        outcome.inserted = new_rows.len() as u64;
        rows.extend(new_rows);
        Ok(outcome)
    }

    async fn drop_staging(&self, staging: &StagingRelation) -> Result<()> {
        self.state.write().await.staging.remove(&staging.name);
        Ok(())
    }

    async fn distinct_dates(
        &self,
        domain: &Domain,
        table: &RasterTable,
        filter: &SliceFilter,
    ) -> Result<BTreeSet<NaiveDate>> {
        let state = self.state.read().await;
        Ok(state
            .rows(domain, &table.name())?
            .iter()
            .filter(|r| filter.matches(&r.tags))
            .filter_map(|r| r.tags.date)
            .collect())
    }

    async fn latest_date(&self, domain: &Domain, table: &RasterTable) -> Result<Option<NaiveDate>> {
        let state = self.state.read().await;
        Ok(state
            .rows(domain, &table.name())?
            .iter()
            .filter_map(|r| r.tags.date)
            .max())
    }

    async fn ensemble_members(&self, domain: &Domain, table: &RasterTable) -> Result<Vec<i32>> {
        let state = self.state.read().await;
        let members: BTreeSet<i32> = state
            .rows(domain, &table.name())?
            .iter()
            .filter_map(|r| r.tags.ensemble)
            .collect();
        Ok(members.into_iter().collect())
    }

    async fn count_slices(
        &self,
        domain: &Domain,
        table: &RasterTable,
        filter: &SliceFilter,
    ) -> Result<u64> {
        let state = self.state.read().await;
        let mut distinct: Vec<&SliceTags> = Vec::new();
        for row in state.rows(domain, &table.name())? {
            if filter.matches(&row.tags) && !distinct.contains(&&row.tags) {
                distinct.push(&row.tags);
            }
        }
        Ok(distinct.len() as u64)
    }

    async fn delete_slices(
        &self,
        domain: &Domain,
        table: &RasterTable,
        filter: &SliceFilter,
    ) -> Result<u64> {
        let mut state = self.state.write().await;
        let rows = state
            .namespace_mut(domain)?
            .rasters
            .get_mut(&table.name())
            .ok_or_else(|| StoreError::missing_table(domain.as_str(), table.name()))?;
        let before = rows.len();
        rows.retain(|r| !filter.matches(&r.tags));
        Ok((before - rows.len()) as u64)
    }

    async fn point_sample(
        &self,
        domain: &Domain,
        table: &RasterTable,
        lon: f64,
        lat: f64,
        filter: &SliceFilter,
    ) -> Result<Vec<PointSample>> {
        let state = self.state.read().await;
        let mut samples: Vec<PointSample> = state
            .rows(domain, &table.name())?
            .iter()
            .filter(|r| filter.matches(&r.tags) && r.tile.pixel_of(lon, lat).is_some())
            .map(|r| PointSample {
                date: r.tags.date,
                ensemble: r.tags.ensemble,
                value: r.tile.value_at(lon, lat),
            })
            .collect();
        samples.sort_by_key(|s| (s.date, s.ensemble));
        Ok(samples)
    }

    async fn union_aggregate(
        &self,
        domain: &Domain,
        request: &AggregateRequest,
    ) -> Result<Option<GridTile>> {
        let state = self.state.read().await;
        let mut matched: Vec<&StoredRow> = Vec::new();
        for source in &request.sources {
            matched.extend(
                state
                    .rows(domain, &source.table.name())?
                    .iter()
                    .filter(|r| source.filter.matches(&r.tags)),
            );
        }
        if matched.is_empty() {
            return Ok(None);
        }

        let result = match request.per_date {
            None => {
                let tiles: Vec<&GridTile> = matched.iter().map(|r| &r.tile).collect();
                GridTile::reduce_stack(&tiles, request.statistic)?
            }
            Some(per_date) => {
                let mut by_date: BTreeMap<Option<NaiveDate>, Vec<&GridTile>> = BTreeMap::new();
                for row in &matched {
                    by_date.entry(row.tags.date).or_default().push(&row.tile);
                }
                let daily = by_date
                    .values()
                    .map(|tiles| GridTile::reduce_stack(tiles, per_date))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                let refs: Vec<&GridTile> = daily.iter().collect();
                GridTile::reduce_stack(&refs, request.statistic)?
            }
        };
        Ok(Some(result))
    }

    async fn pixel_centroids(
        &self,
        domain: &Domain,
        table: &RasterTable,
        date: NaiveDate,
        admin1: &str,
    ) -> Result<Vec<(f64, f64)>> {
        let state = self.state.read().await;
        state.require_table(domain, ADMIN_TABLE)?;
        let areas: Vec<&MultiPolygon> = state
            .namespace(domain)?
            .admin
            .iter()
            .filter(|f| f.admin1 == admin1)
            .map(|f| &f.geometry)
            .collect();

        let mut centroids = Vec::new();
        for row in state.rows(domain, &table.name())? {
            if row.tags.date != Some(date) {
                continue;
            }
            let tile = &row.tile;
            for r in 0..tile.height {
                for c in 0..tile.width {
                    if tile.get(c, r).is_none() {
                        continue;
                    }
                    let (x, y) = tile.cell_center(c, r);
                    if areas.iter().any(|a| a.contains(x, y)) {
                        centroids.push((x, y));
                    }
                }
            }
        }
        Ok(centroids)
    }

    async fn insert_soils(&self, domain: &Domain, points: &[SoilPoint]) -> Result<u64> {
        let mut state = self.state.write().await;
        state.require_table(domain, SOIL_TABLE)?;
        let ns = state.namespace_mut(domain)?;

        let mut batch: Vec<SoilPoint> = Vec::with_capacity(points.len());
        for p in points {
            let taken = ns.soils.iter().chain(batch.iter()).any(|s| s.lon == p.lon && s.lat == p.lat);
            if taken {
                return Err(StoreError::DuplicateSoilPoint {
                    domain: domain.to_string(),
                    lon: p.lon,
                    lat: p.lat,
                });
            }
            batch.push(p.clone());
        }
        ns.soils.extend(batch);
        Ok(points.len() as u64)
    }

    async fn soils(
        &self,
        domain: &Domain,
        admin1: &str,
        mask: Option<SoilMask>,
    ) -> Result<Vec<SoilPoint>> {
        let state = self.state.read().await;
        state.require_table(domain, SOIL_TABLE)?;
        state.require_table(domain, ADMIN_TABLE)?;
        let ns = state.namespace(domain)?;
        let areas: Vec<&MultiPolygon> = ns
            .admin
            .iter()
            .filter(|f| f.admin1 == admin1)
            .map(|f| &f.geometry)
            .collect();
        Ok(ns
            .soils
            .iter()
            .filter(|s| s.passes(mask) && areas.iter().any(|a| a.contains(s.lon, s.lat)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_readers_share_the_state() {
        let store = MemoryStore::new();
        let domain = Domain::new("readers").unwrap();
        store.create_namespace(&domain).await.unwrap();

        let held = store.state.read().await;
        let exists = tokio::time::timeout(Duration::from_secs(1), store.namespace_exists(&domain)).await;
        assert!(matches!(exists, Ok(Ok(true))));

        // a writer waits until the reader is gone
        let other = Domain::new("writers").unwrap();
        let blocked = tokio::time::timeout(Duration::from_millis(50), store.create_namespace(&other)).await;
        assert!(blocked.is_err());
        drop(held);
        store.create_namespace(&other).await.unwrap();
        assert!(store.namespace_exists(&other).await.unwrap());
    }
}
