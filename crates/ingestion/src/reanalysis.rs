//! Daily reanalysis ingestion.
//!
//! One slice per variable per date, fetched for the padded domain envelope and
//! staged with overwrite. Datasets without radiation borrow it from their
//! donor dataset, but only on days where every native variable was available.

use std::sync::Arc;

use agro_common::{Dataset, DatasetKind, DateRange, GridTile, Variable};
use chrono::NaiveDate;
use raster_store::{Domain, RasterStore, RasterTable, SliceKey, TableRef};
use tracing::{info, instrument};

use crate::error::{IngestionError, Result};
use crate::source::ObservationSource;

/// Outcome of one day of ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordReport {
    pub date: NaiveDate,
    pub ingested: Vec<Variable>,
    pub skipped: Vec<Variable>,
}

impl RecordReport {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            ingested: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

pub struct ReanalysisIngester {
    store: RasterStore,
    source: Arc<dyn ObservationSource>,
    envelope_pad: f64,
}

impl ReanalysisIngester {
    pub fn new(store: RasterStore, source: Arc<dyn ObservationSource>, envelope_pad: f64) -> Self {
        Self {
            store,
            source,
            envelope_pad,
        }
    }

    /// Ingest every variable of `dataset` for one day.
    #[instrument(skip_all, fields(domain = %domain, dataset = %dataset, date = %date))]
    pub async fn ingest_record(
        &self,
        domain: &Domain,
        dataset: Dataset,
        date: NaiveDate,
    ) -> Result<RecordReport> {
        self.prepare(domain, dataset).await?;
        self.ingest_day(domain, dataset, date).await
    }

    /// Ingest every day of `range`, inclusive.
    #[instrument(skip_all, fields(domain = %domain, dataset = %dataset, from = %range.from, to = %range.to))]
    pub async fn ingest_series(
        &self,
        domain: &Domain,
        dataset: Dataset,
        range: DateRange,
    ) -> Result<Vec<RecordReport>> {
        self.prepare(domain, dataset).await?;
        let mut reports = Vec::with_capacity(range.len());
        for date in range.days() {
            reports.push(self.ingest_day(domain, dataset, date).await?);
        }
        let skipped: usize = reports.iter().map(|r| r.skipped.len()).sum();
        info!(days = reports.len(), skipped, "Reanalysis series ingested");
        Ok(reports)
    }

    async fn prepare(&self, domain: &Domain, dataset: Dataset) -> Result<()> {
        if dataset.kind() != DatasetKind::Reanalysis {
            return Err(IngestionError::UnsupportedDataset {
                dataset: dataset.to_string(),
                reason: "not a reanalysis".to_string(),
            });
        }
        self.store.schema.require_table(domain, TableRef::Admin).await?;
        for variable in dataset.variables() {
            self.store
                .schema
                .ensure_table(domain, RasterTable::Series(dataset, *variable))
                .await?;
        }
        Ok(())
    }

    async fn ingest_day(&self, domain: &Domain, dataset: Dataset, date: NaiveDate) -> Result<RecordReport> {
        let bbox = self.store.schema.envelope(domain, self.envelope_pad).await?;
        let mut report = RecordReport::new(date);

        for variable in dataset.native_variables() {
            match self.fetch(dataset, *variable, date, &bbox).await? {
                Some(tile) => {
                    self.store_tile(domain, dataset, *variable, date, &tile).await?;
                    report.ingested.push(*variable);
                }
                None => report.skipped.push(*variable),
            }
        }

        if let Some(donor) = dataset.srad_donor() {
            if report.is_complete() {
                match self.fetch(donor, Variable::Srad, date, &bbox).await? {
                    Some(tile) => {
                        self.store_tile(domain, dataset, Variable::Srad, date, &tile).await?;
                        report.ingested.push(Variable::Srad);
                    }
                    None => report.skipped.push(Variable::Srad),
                }
            } else {
                info!(date = %date, donor = %donor, "Skipping borrowed radiation for an incomplete day");
                report.skipped.push(Variable::Srad);
            }
        }
        Ok(report)
    }

    /// `None` when the source has no data for the request.
    async fn fetch(
        &self,
        dataset: Dataset,
        variable: Variable,
        date: NaiveDate,
        bbox: &agro_common::BoundingBox,
    ) -> Result<Option<GridTile>> {
        match self.source.fetch_grid_tile(dataset, variable, date, bbox).await {
            Ok(tile) => Ok(Some(tile)),
            Err(e) if e.is_no_data() => {
                info!(dataset = %dataset, variable = %variable, date = %date, "No upstream data, skipping");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn store_tile(
        &self,
        domain: &Domain,
        dataset: Dataset,
        variable: Variable,
        date: NaiveDate,
        tile: &GridTile,
    ) -> Result<()> {
        let table = RasterTable::Series(dataset, variable);
        self.store
            .staging
            .ingest_slice(domain, &table, tile, &SliceKey::Dated(date))
            .await?;
        info!(table = %table, date = %date, "Slice ingested");
        Ok(())
    }
}
