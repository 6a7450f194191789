//! Monthly bias correction of forecast mean temperature.
//!
//! For each calendar month present in a member's forecast, the bias is the
//! climatological mean temperature minus the forecast's own monthly mean.
//! Adjusted daily means are split into minimum and maximum temperature using
//! half the climatological mean daily range on either side.

use std::collections::BTreeMap;

use agro_common::{GridResult, GridTile, Statistic};
use chrono::{Datelike, NaiveDate};

/// Climatology grids of one calendar month.
#[derive(Debug, Clone)]
pub struct MonthlyReference {
    pub tmean_mean: GridTile,
    pub trange_mean: GridTile,
}

/// Corrected minimum and maximum temperature of one day.
#[derive(Debug, Clone)]
pub struct DailyExtremes {
    pub date: NaiveDate,
    pub tmin: GridTile,
    pub tmax: GridTile,
}

/// Group tiles by calendar month.
pub fn by_month(tiles: &[(NaiveDate, GridTile)]) -> BTreeMap<u32, Vec<&(NaiveDate, GridTile)>> {
    let mut months: BTreeMap<u32, Vec<&(NaiveDate, GridTile)>> = BTreeMap::new();
    for entry in tiles {
        months.entry(entry.0.month()).or_default().push(entry);
    }
    months
}

/// `climatology - mean(forecast)` cell by cell.
pub fn monthly_bias(climatology: &GridTile, forecast: &[&GridTile]) -> GridResult<GridTile> {
    let forecast_mean = GridTile::reduce_stack(forecast, Statistic::Mean)?;
    climatology.zip_map(&forecast_mean, |clim, fc| clim - fc)
}

/// Apply the bias and split into extremes around the adjusted mean.
pub fn split_extremes(tmean: &GridTile, bias: &GridTile, trange_mean: &GridTile) -> GridResult<(GridTile, GridTile)> {
    let adjusted = tmean.zip_map(bias, |t, b| t + b)?;
    let tmin = adjusted.zip_map(trange_mean, |t, r| t - 0.5 * r)?;
    let tmax = adjusted.zip_map(trange_mean, |t, r| t + 0.5 * r)?;
    Ok((tmin, tmax))
}

/// Bias-correct a month of daily mean temperature tiles.
pub fn correct_month(
    days: &[&(NaiveDate, GridTile)],
    reference: &MonthlyReference,
) -> GridResult<Vec<DailyExtremes>> {
    let stack: Vec<&GridTile> = days.iter().map(|(_, tile)| tile).collect();
    let bias = monthly_bias(&reference.tmean_mean, &stack)?;
    days.iter()
        .map(|(date, tile)| {
            let (tmin, tmax) = split_extremes(tile, &bias, &reference.trange_mean)?;
            Ok(DailyExtremes {
                date: *date,
                tmin,
                tmax,
            })
        })
        .collect()
}
