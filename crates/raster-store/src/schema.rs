//! Domain Schema Manager: namespace, boundary and fixed table set of a domain.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use agro_common::{AdminFeature, BoundingBox, Dataset};

use crate::error::{Result, StoreError};
use crate::gateway::SpatialStore;
use crate::tables::{Domain, RasterTable, TableRef, ADMIN_TABLE, BBOX_VIEW};

/// Creates and verifies the tables a domain owns.
#[derive(Clone)]
pub struct SchemaManager {
    store: Arc<dyn SpatialStore>,
}

impl SchemaManager {
    pub fn new(store: Arc<dyn SpatialStore>) -> Self {
        Self { store }
    }

    /// Onboard a domain.
    ///
    /// An existing boundary is overwritten with a warning; otherwise the
    /// namespace is created. The envelope view is always rebuilt. One series
    /// table per variable of each dataset in `reanalysis`, the soil table and
    /// the cultivar table are created when missing; existing ones are kept.
    #[instrument(skip_all, fields(domain = %domain, features = features.len()))]
    pub async fn create_domain(
        &self,
        domain: &Domain,
        features: &[AdminFeature],
        reanalysis: &[Dataset],
    ) -> Result<()> {
        if self.store.table_exists(domain, ADMIN_TABLE).await? {
            warn!(domain = %domain, "Administrative boundary already exists, overwriting");
        } else {
            self.store.create_namespace(domain).await?;
        }

        self.store.replace_boundary(domain, features).await?;
        self.store.refresh_envelope(domain).await?;

        for dataset in reanalysis {
            for variable in dataset.variables() {
                self.ensure_table(domain, RasterTable::Series(*dataset, *variable))
                    .await?;
            }
        }
        self.ensure_table(domain, TableRef::Soil).await?;
        self.ensure_table(domain, TableRef::Cultivars).await?;

        info!(domain = %domain, units = features.len(), "Domain onboarded");
        Ok(())
    }

    /// Create a table with its fixed columns and indexes unless it exists.
    /// Returns whether it was created.
    pub async fn ensure_table(&self, domain: &Domain, table: impl Into<TableRef>) -> Result<bool> {
        let table = table.into();
        let name = table.name();
        if self.store.table_exists(domain, &name).await? {
            return Ok(false);
        }
        if !self.store.namespace_exists(domain).await? {
            return Err(StoreError::MissingDomain(domain.to_string()));
        }
        self.store
            .create_table(domain, &name, table.kind().descriptor())
            .await?;
        info!(domain = %domain, table = %name, "Created table");
        Ok(true)
    }

    /// Fail unless the domain has been onboarded (its boundary table exists).
    pub async fn require_domain(&self, domain: &Domain) -> Result<()> {
        if self.store.table_exists(domain, ADMIN_TABLE).await? {
            Ok(())
        } else {
            Err(StoreError::missing_table(domain.as_str(), ADMIN_TABLE))
        }
    }

    /// Fail unless the table exists.
    pub async fn require_table(&self, domain: &Domain, table: impl Into<TableRef>) -> Result<()> {
        let name = table.into().name();
        if self.store.table_exists(domain, &name).await? {
            Ok(())
        } else {
            Err(StoreError::missing_table(domain.as_str(), name))
        }
    }

    /// Cached domain envelope grown by `pad` degrees on every side.
    pub async fn envelope(&self, domain: &Domain, pad: f64) -> Result<BoundingBox> {
        self.store
            .envelope(domain)
            .await?
            .map(|bbox| bbox.expand(pad))
            .ok_or_else(|| StoreError::missing_table(domain.as_str(), BBOX_VIEW))
    }

    /// Fail unless exactly one boundary feature is labelled `admin1`.
    pub async fn check_admin1(&self, domain: &Domain, admin1: &str) -> Result<()> {
        self.require_domain(domain).await?;
        let count = self.store.admin_geometries(domain, admin1).await?.len() as u64;
        if count == 1 {
            Ok(())
        } else {
            Err(StoreError::AdminUnit {
                domain: domain.to_string(),
                admin1: admin1.to_string(),
                count,
            })
        }
    }
}
