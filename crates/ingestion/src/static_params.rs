//! Static parameter grids (soil temperature amplitude, crop calendars, ...).

use std::path::Path;

use agro_common::GridTile;
use raster_store::{Domain, RasterStore, RasterTable, SliceKey};
use tracing::{info, instrument};

use crate::error::Result;
use crate::file_source::read_tile;

pub struct StaticIngester {
    store: RasterStore,
}

impl StaticIngester {
    pub fn new(store: RasterStore) -> Self {
        Self { store }
    }

    /// Store a named static grid. A name already present is rejected and the
    /// stored grid is left as it was.
    #[instrument(skip_all, fields(domain = %domain, name = %name))]
    pub async fn ingest_static(&self, domain: &Domain, tile: &GridTile, name: &str) -> Result<()> {
        self.store.schema.ensure_table(domain, RasterTable::Static).await?;
        self.store
            .staging
            .ingest_slice(
                domain,
                &RasterTable::Static,
                tile,
                &SliceKey::Parameter(name.to_string()),
            )
            .await?;
        info!(domain = %domain, name = %name, "Static parameter ingested");
        Ok(())
    }

    pub async fn ingest_static_file(&self, domain: &Domain, path: &Path, name: &str) -> Result<()> {
        let tile = read_tile(path).await?;
        self.ingest_static(domain, &tile, name).await
    }
}
