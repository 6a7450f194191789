//! Climatology Aggregator: twelve monthly aggregate grids per statistic.
//!
//! Rows are `(variable, month)` where `variable` names the statistic:
//! `{var}_mean` for each base variable, plus four temperature statistics
//! derived from tmax and tmin (`tmean_mean`, `tmean_range`, `trange_mean`,
//! `trange_range`).

use std::sync::Arc;

use tracing::{info, instrument};

use agro_common::{ClimatologyStat, Dataset, GridTile, Statistic, Variable};

use crate::error::{Result, StoreError};
use crate::gateway::{AggregateRequest, AggregateSource, SliceFilter, SpatialStore};
use crate::schema::SchemaManager;
use crate::staging::StagedIngestion;
use crate::tables::{Domain, RasterTable, SliceKey};

#[derive(Clone)]
pub struct ClimatologyAggregator {
    store: Arc<dyn SpatialStore>,
    schema: SchemaManager,
    staging: StagedIngestion,
}

impl ClimatologyAggregator {
    pub fn new(store: Arc<dyn SpatialStore>, staging: StagedIngestion) -> Self {
        Self {
            schema: SchemaManager::new(store.clone()),
            store,
            staging,
        }
    }

    /// Compute and store the climatology of `dataset` for `variables`.
    ///
    /// Fails if the climatology table already exists. Every grid is computed
    /// before the table is created, so a month without data leaves nothing
    /// behind. Returns the number of rows written.
    #[instrument(skip_all, fields(domain = %domain, dataset = %dataset))]
    pub async fn build(
        &self,
        domain: &Domain,
        dataset: Dataset,
        variables: &[Variable],
    ) -> Result<usize> {
        let clim = RasterTable::Climatology(dataset);
        if self.store.table_exists(domain, &clim.name()).await? {
            return Err(StoreError::TableExists {
                domain: domain.to_string(),
                table: clim.name(),
            });
        }
        for variable in variables {
            self.schema
                .require_table(domain, RasterTable::Series(dataset, *variable))
                .await?;
        }

        let with_temperature =
            variables.contains(&Variable::Tmax) && variables.contains(&Variable::Tmin);

        let mut rows: Vec<(ClimatologyStat, u32, GridTile)> = Vec::new();
        for month in 1..=12u32 {
            let mut tmax_mean = None;
            let mut tmin_mean = None;
            for variable in variables {
                let table = RasterTable::Series(dataset, *variable);
                let request = AggregateRequest::single(
                    table,
                    SliceFilter::all().date_month(month),
                    Statistic::Mean,
                );
                let grid = self.aggregate(domain, &request, &table.name(), month).await?;
                match variable {
                    Variable::Tmax => tmax_mean = Some(grid.clone()),
                    Variable::Tmin => tmin_mean = Some(grid.clone()),
                    _ => {}
                }
                rows.push((ClimatologyStat::Mean(*variable), month, grid));
            }

            if let (true, Some(tmax), Some(tmin)) = (with_temperature, tmax_mean, tmin_mean) {
                let tmean_mean = GridTile::reduce_stack(&[&tmax, &tmin], Statistic::Mean)?;
                rows.push((ClimatologyStat::TmeanMean, month, tmean_mean));

                let derived = [
                    (ClimatologyStat::TmeanRange, Statistic::Mean, Statistic::Range),
                    (ClimatologyStat::TrangeMean, Statistic::Range, Statistic::Mean),
                    (ClimatologyStat::TrangeRange, Statistic::Range, Statistic::Range),
                ];
                for (stat, per_date, statistic) in derived {
                    let request = AggregateRequest {
                        sources: [Variable::Tmax, Variable::Tmin]
                            .into_iter()
                            .map(|v| AggregateSource {
                                table: RasterTable::Series(dataset, v),
                                filter: SliceFilter::all().date_month(month),
                            })
                            .collect(),
                        per_date: Some(per_date),
                        statistic,
                    };
                    let grid = self.aggregate(domain, &request, &stat.name(), month).await?;
                    rows.push((stat, month, grid));
                }
            }
            info!(month, rows = rows.len(), "Climatology month computed");
        }

        self.schema.ensure_table(domain, clim).await?;
        for (stat, month, grid) in &rows {
            self.staging
                .ingest_slice(domain, &clim, grid, &SliceKey::Climatology(*stat, *month))
                .await?;
        }
        info!(domain = %domain, table = %clim, rows = rows.len(), "Climatology stored");
        Ok(rows.len())
    }

    async fn aggregate(
        &self,
        domain: &Domain,
        request: &AggregateRequest,
        what: &str,
        month: u32,
    ) -> Result<GridTile> {
        self.store
            .union_aggregate(domain, request)
            .await?
            .ok_or_else(|| StoreError::EmptyAggregate {
                domain: domain.to_string(),
                table: what.to_string(),
                detail: format!("month {}", month),
            })
    }

    /// Drop the climatology table so it can be rebuilt.
    pub async fn drop(&self, domain: &Domain, dataset: Dataset) -> Result<()> {
        let clim = RasterTable::Climatology(dataset);
        self.store.drop_table(domain, &clim.name()).await?;
        info!(domain = %domain, table = %clim, "Climatology dropped");
        Ok(())
    }

    /// Read back one climatology grid.
    pub async fn grid(
        &self,
        domain: &Domain,
        dataset: Dataset,
        stat: ClimatologyStat,
        month: u32,
    ) -> Result<GridTile> {
        let clim = RasterTable::Climatology(dataset);
        self.schema.require_table(domain, clim).await?;
        let filter = SliceFilter::for_key(&SliceKey::Climatology(stat, month));
        let request = AggregateRequest::single(clim, filter, Statistic::Mean);
        self.aggregate(domain, &request, &stat.name(), month).await
    }
}
