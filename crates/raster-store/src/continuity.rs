//! Continuity Verifier: which calendar days of a range have no stored slice.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use agro_common::DateRange;

use crate::error::{Result, StoreError};
use crate::gateway::{SliceFilter, SpatialStore};
use crate::tables::{Domain, RasterTable};

#[derive(Clone)]
pub struct ContinuityVerifier {
    store: Arc<dyn SpatialStore>,
}

impl ContinuityVerifier {
    pub fn new(store: Arc<dyn SpatialStore>) -> Self {
        Self { store }
    }

    /// Calendar days of `range` with no slice in `table`.
    pub async fn missing_dates(
        &self,
        domain: &Domain,
        table: &RasterTable,
        range: DateRange,
    ) -> Result<BTreeSet<NaiveDate>> {
        self.missing(domain, table, range, None).await
    }

    /// Calendar days of `range` with no slice for ensemble member `ensemble`.
    pub async fn missing_member_dates(
        &self,
        domain: &Domain,
        table: &RasterTable,
        range: DateRange,
        ensemble: i32,
    ) -> Result<BTreeSet<NaiveDate>> {
        self.missing(domain, table, range, Some(ensemble)).await
    }

    async fn missing(
        &self,
        domain: &Domain,
        table: &RasterTable,
        range: DateRange,
        ensemble: Option<i32>,
    ) -> Result<BTreeSet<NaiveDate>> {
        if !self.store.table_exists(domain, &table.name()).await? {
            return Err(StoreError::missing_table(domain.as_str(), table.name()));
        }
        let mut filter = SliceFilter::all().dates(range);
        filter.ensemble = ensemble;
        let stored = self.store.distinct_dates(domain, table, &filter).await?;
        let missing: BTreeSet<NaiveDate> = range.days().filter(|d| !stored.contains(d)).collect();
        debug!(
            domain = %domain,
            table = %table,
            stored = stored.len(),
            missing = missing.len(),
            "Checked continuity"
        );
        Ok(missing)
    }

    /// Fail with the missing dates unless `range` is fully covered.
    pub async fn require_complete(
        &self,
        domain: &Domain,
        table: &RasterTable,
        range: DateRange,
        ensemble: Option<i32>,
    ) -> Result<()> {
        let missing = self.missing(domain, table, range, ensemble).await?;
        if missing.is_empty() {
            return Ok(());
        }
        Err(StoreError::IncompleteSeries {
            domain: domain.to_string(),
            table: table.name(),
            from: range.from,
            to: range.to,
            missing: missing.into_iter().collect(),
        })
    }

    /// Most recent stored date of a table.
    pub async fn latest_date(&self, domain: &Domain, table: &RasterTable) -> Result<Option<NaiveDate>> {
        if !self.store.table_exists(domain, &table.name()).await? {
            return Err(StoreError::missing_table(domain.as_str(), table.name()));
        }
        self.store.latest_date(domain, table).await
    }
}
