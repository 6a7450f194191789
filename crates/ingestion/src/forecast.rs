//! Forecast ensemble ingestion with climatology-based bias correction.

use std::sync::Arc;

use agro_common::resample::resample_like;
use agro_common::{ClimatologyStat, Dataset, GridTile, Variable};
use chrono::NaiveDate;
use raster_store::{Domain, RasterStore, RasterTable, SliceKey, TableRef};
use tracing::{info, instrument};

use crate::bias::{by_month, correct_month, MonthlyReference};
use crate::error::Result;
use crate::source::{ForecastField, ForecastSource};

/// Slices written for one ensemble member.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberReport {
    pub member: i32,
    pub rain_days: usize,
    pub temperature_days: usize,
}

pub struct ForecastIngester {
    store: RasterStore,
    source: Arc<dyn ForecastSource>,
    climatology: Dataset,
    envelope_pad: f64,
}

impl ForecastIngester {
    pub fn new(
        store: RasterStore,
        source: Arc<dyn ForecastSource>,
        climatology: Dataset,
        envelope_pad: f64,
    ) -> Self {
        Self {
            store,
            source,
            climatology,
            envelope_pad,
        }
    }

    /// Ingest temperature then rain for every member in `members`.
    #[instrument(skip_all, fields(domain = %domain))]
    pub async fn ingest_forecast(
        &self,
        domain: &Domain,
        members: impl IntoIterator<Item = i32>,
    ) -> Result<Vec<MemberReport>> {
        let mut reports = Vec::new();
        for member in members {
            let report = MemberReport {
                member,
                temperature_days: self.ingest_member_temperature(domain, member).await?,
                rain_days: self.ingest_member_rain(domain, member).await?,
            };
            reports.push(report);
        }
        Ok(reports)
    }

    /// Resample a member's rain onto the climatology grid and store it.
    /// Returns the number of days written, 0 when the member has no data.
    #[instrument(skip_all, fields(domain = %domain, member = member))]
    pub async fn ingest_member_rain(&self, domain: &Domain, member: i32) -> Result<usize> {
        let table = self.prepare(domain, &[Variable::Rain]).await?[0];
        let reference = self.reference_grid(domain).await?;
        let Some(tiles) = self.fetch(domain, ForecastField::Precipitation, member).await? else {
            return Ok(0);
        };

        for (date, tile) in &tiles {
            let tile = resample_like(tile, &reference);
            self.store_member(domain, table, *date, member, &tile).await?;
        }
        Ok(tiles.len())
    }

    /// Bias-correct a member's daily mean temperature and store the derived
    /// minimum and maximum. Returns the number of days written.
    #[instrument(skip_all, fields(domain = %domain, member = member))]
    pub async fn ingest_member_temperature(&self, domain: &Domain, member: i32) -> Result<usize> {
        let tables = self.prepare(domain, &[Variable::Tmin, Variable::Tmax]).await?;
        let (tmin_table, tmax_table) = (tables[0], tables[1]);
        let reference = self.reference_grid(domain).await?;
        let Some(tiles) = self.fetch(domain, ForecastField::Temperature, member).await? else {
            return Ok(0);
        };

        let resampled: Vec<(NaiveDate, GridTile)> = tiles
            .iter()
            .map(|(date, tile)| (*date, resample_like(tile, &reference)))
            .collect();

        // Correct every month before writing anything.
        let mut corrected = Vec::with_capacity(resampled.len());
        for (month, days) in by_month(&resampled) {
            let monthly = MonthlyReference {
                tmean_mean: self.climatology_grid(domain, ClimatologyStat::TmeanMean, month).await?,
                trange_mean: self.climatology_grid(domain, ClimatologyStat::TrangeMean, month).await?,
            };
            corrected.extend(correct_month(&days, &monthly)?);
        }
        corrected.sort_by_key(|d| d.date);

        for day in &corrected {
            self.store_member(domain, tmin_table, day.date, member, &day.tmin).await?;
            self.store_member(domain, tmax_table, day.date, member, &day.tmax).await?;
        }
        Ok(corrected.len())
    }

    async fn prepare(&self, domain: &Domain, variables: &[Variable]) -> Result<Vec<RasterTable>> {
        self.store.schema.require_table(domain, TableRef::Admin).await?;
        let mut tables = Vec::with_capacity(variables.len());
        for variable in variables {
            let table = RasterTable::Series(Dataset::Nmme, *variable);
            self.store.schema.ensure_table(domain, table).await?;
            tables.push(table);
        }
        Ok(tables)
    }

    /// Grid every forecast tile is resampled onto.
    async fn reference_grid(&self, domain: &Domain) -> Result<GridTile> {
        self.climatology_grid(domain, ClimatologyStat::TmeanMean, 1).await
    }

    async fn climatology_grid(&self, domain: &Domain, stat: ClimatologyStat, month: u32) -> Result<GridTile> {
        Ok(self
            .store
            .climatology
            .grid(domain, self.climatology, stat, month)
            .await?)
    }

    async fn fetch(
        &self,
        domain: &Domain,
        field: ForecastField,
        member: i32,
    ) -> Result<Option<Vec<(NaiveDate, GridTile)>>> {
        let bbox = self.store.schema.envelope(domain, self.envelope_pad).await?;
        match self.source.fetch_ensemble_tiles(field, member, &bbox).await {
            Ok(tiles) if tiles.is_empty() => {
                info!(field = %field, member, "Forecast member is empty, skipping");
                Ok(None)
            }
            Ok(tiles) => Ok(Some(tiles)),
            Err(e) if e.is_no_data() => {
                info!(field = %field, member, "No upstream forecast data, skipping");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn store_member(
        &self,
        domain: &Domain,
        table: RasterTable,
        date: NaiveDate,
        member: i32,
        tile: &GridTile,
    ) -> Result<()> {
        self.store
            .staging
            .ingest_slice(domain, &table, tile, &SliceKey::Member(date, member))
            .await?;
        info!(table = %table, date = %date, member, "Forecast slice ingested");
        Ok(())
    }
}
