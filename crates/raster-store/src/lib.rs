//! Raster time-series store for crop-weather domains.
//!
//! Provides:
//! - The [`SpatialStore`] gateway contract with PostGIS and in-memory backends
//! - A typed registry of the per-domain table set
//! - The store lifecycle: schema management, staged ingestion, continuity
//!   checks, point extraction and monthly climatology

pub mod climatology;
pub mod config;
pub mod continuity;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod memory;
pub mod postgis;
pub mod schema;
pub mod staging;
pub mod tables;
pub mod wkb;

use std::sync::Arc;

pub use climatology::ClimatologyAggregator;
pub use config::StoreConfig;
pub use continuity::ContinuityVerifier;
pub use error::{Result, StoreError};
pub use extract::PointExtractor;
pub use gateway::{
    AggregateRequest, AggregateSource, MergeOutcome, PointSample, SliceFilter, SoilMask,
    SoilPoint, SpatialStore, StagingRelation,
};
pub use memory::MemoryStore;
pub use postgis::PostgisStore;
pub use schema::SchemaManager;
pub use staging::StagedIngestion;
pub use tables::{Domain, RasterTable, SliceKey, TableKind, TableRef};

/// The lifecycle components wired to one gateway.
#[derive(Clone)]
pub struct RasterStore {
    pub gateway: Arc<dyn SpatialStore>,
    pub schema: SchemaManager,
    pub staging: StagedIngestion,
    pub continuity: ContinuityVerifier,
    pub extract: PointExtractor,
    pub climatology: ClimatologyAggregator,
}

impl RasterStore {
    pub fn new(gateway: Arc<dyn SpatialStore>, staging_tile_size: usize) -> Self {
        let staging = StagedIngestion::new(gateway.clone(), staging_tile_size);
        Self {
            schema: SchemaManager::new(gateway.clone()),
            continuity: ContinuityVerifier::new(gateway.clone()),
            extract: PointExtractor::new(gateway.clone()),
            climatology: ClimatologyAggregator::new(gateway.clone(), staging.clone()),
            staging,
            gateway,
        }
    }

    /// Connect to PostGIS using the given configuration.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let store = PostgisStore::connect(&config.database_url, config.max_connections).await?;
        Ok(Self::new(Arc::new(store), config.staging_tile_size))
    }
}
