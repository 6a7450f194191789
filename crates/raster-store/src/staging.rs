//! Staged Ingestion: the only way a grid slice enters a permanent table.
//!
//! A tile is loaded into a uniquely named staging relation, tagged with its
//! slice key, then copied into the permanent table in one transaction that
//! also removes any slice already stored under the same key. The staging
//! relation is dropped whatever happens.

use std::sync::Arc;

use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use agro_common::GridTile;

use crate::error::{Result, StoreError};
use crate::gateway::{MergeOutcome, SliceFilter, SpatialStore, StagingRelation};
use crate::tables::{Domain, RasterTable, SliceKey};

/// Prefix of staging relation names.
pub const STAGING_PREFIX: &str = "stg_";

/// Fresh, collision-resistant staging relation name.
pub fn staging_name() -> String {
    format!("{}{}", STAGING_PREFIX, Uuid::new_v4().simple())
}

#[derive(Clone)]
pub struct StagedIngestion {
    store: Arc<dyn SpatialStore>,
    tile_size: usize,
}

impl StagedIngestion {
    pub fn new(store: Arc<dyn SpatialStore>, tile_size: usize) -> Self {
        Self { store, tile_size }
    }

    /// Store `tile` under `key` in `table`.
    ///
    /// Dated and member keys replace an existing slice (with a warning).
    /// Parameter keys never overwrite: an existing name is an error and the
    /// stored grid is left untouched.
    #[instrument(skip_all, fields(domain = %domain, table = %table, key = %key))]
    pub async fn ingest_slice(
        &self,
        domain: &Domain,
        table: &RasterTable,
        tile: &GridTile,
        key: &SliceKey,
    ) -> Result<MergeOutcome> {
        key.check_target(table)?;
        if !self.store.table_exists(domain, &table.name()).await? {
            return Err(StoreError::missing_table(domain.as_str(), table.name()));
        }

        let filter = SliceFilter::for_key(key);
        let existing = self.store.count_slices(domain, table, &filter).await?;
        let replace = match key {
            SliceKey::Parameter(name) => {
                if existing > 0 {
                    return Err(StoreError::ParameterExists {
                        domain: domain.to_string(),
                        name: name.clone(),
                    });
                }
                None
            }
            _ => {
                if existing > 0 {
                    warn!(
                        domain = %domain,
                        table = %table,
                        key = %key,
                        "Slice already stored, overwriting"
                    );
                }
                Some(&filter)
            }
        };

        let staging = StagingRelation {
            name: staging_name(),
        };
        let result = self.stage_and_merge(&staging, domain, table, tile, key, replace).await;

        if let Err(e) = self.store.drop_staging(&staging).await {
            error!(staging = %staging.name, error = %e, "Failed to drop staging relation");
        }

        let outcome = result?;
        debug!(
            replaced = outcome.replaced,
            inserted = outcome.inserted,
            "Slice merged"
        );
        Ok(outcome)
    }

    async fn stage_and_merge(
        &self,
        staging: &StagingRelation,
        domain: &Domain,
        table: &RasterTable,
        tile: &GridTile,
        key: &SliceKey,
        replace: Option<&SliceFilter>,
    ) -> Result<MergeOutcome> {
        self.store.load_staging(staging, tile, self.tile_size).await?;
        self.store.tag_staging(staging, key).await?;
        self.store.merge_staging(staging, domain, table, replace).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::is_identifier;

    #[test]
    fn test_staging_names_are_unique_identifiers() {
        let a = staging_name();
        let b = staging_name();
        assert_ne!(a, b);
        assert!(a.starts_with(STAGING_PREFIX));
        assert!(is_identifier(&a));
    }
}
