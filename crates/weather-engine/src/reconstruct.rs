//! Point weather reconstruction across the historical/forecast boundary.
//!
//! A simulation window that ends inside the historical record is read
//! straight from the reanalysis tables. Otherwise the series is stitched:
//!
//! 1. historical tail from `min(start, latest - 365)` to `latest`
//! 2. one stored forecast member from `latest` to the forecast horizon, with
//!    radiation predicted by a [`RadiationModel`] trained on the tail
//! 3. days past the horizon repeat the same day of an earlier year
//!
//! Historical rows win where segments overlap. The result is trimmed to the
//! window, converted to simulator units and checked for consistency.

use std::collections::BTreeMap;

use agro_common::{AlignedSeries, DateRange, Variable, KELVIN_OFFSET};
use chrono::{Duration, NaiveDate};
use rand::seq::SliceRandom;
use rand::Rng;
use raster_store::{Domain, RasterStore, RasterTable};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::radiation::RadiationModel;

/// Days in the year used for the historical tail and the fallback shift.
const YEAR_DAYS: i64 = 365;

/// Radiation is stored in J/m² and simulated in MJ/m².
const SRAD_SCALE: f64 = 1e6;

/// Forecast variables; radiation is reconstructed.
const FORECAST_VARIABLES: [Variable; 3] = [Variable::Tmax, Variable::Tmin, Variable::Rain];

/// How a series was assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "branch", rename_all = "snake_case")]
pub enum Branch {
    /// The historical record covers the whole window.
    EndOfSeason,
    /// Historical tail, forecast member and fallback days. `member` is
    /// `None` when no forecast reaches past the record.
    Forecast {
        member: Option<i32>,
        latest_historical: NaiveDate,
        forecast_days: usize,
        fallback_days: usize,
    },
}

/// Daily weather for one point in simulator units: temperatures in °C,
/// radiation in MJ/m², rain in mm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointWeather {
    pub lon: f64,
    pub lat: f64,
    pub branch: Branch,
    pub series: AlignedSeries,
}

#[derive(Clone)]
pub struct WeatherReconstructor {
    store: RasterStore,
    config: EngineConfig,
}

impl WeatherReconstructor {
    pub fn new(store: RasterStore, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Simulation window for a planting date: spin-up days before it and the
    /// maximum season length after it.
    pub fn window(&self, planting: NaiveDate) -> Result<DateRange> {
        let from = planting - Duration::days(self.config.spinup_days);
        let to = planting + Duration::days(self.config.max_sim_length_days);
        Ok(DateRange::new(from, to)?)
    }

    /// Last date of the historical rain table, which marks the end of the
    /// record for every variable.
    pub async fn latest_historical(&self, domain: &Domain) -> Result<NaiveDate> {
        let table = RasterTable::Series(self.config.reanalysis, Variable::Rain);
        self.store
            .continuity
            .latest_date(domain, &table)
            .await?
            .ok_or_else(|| EngineError::NoHistory {
                domain: domain.to_string(),
                table: table.name(),
            })
    }

    /// Complete weather for `window` at one point.
    ///
    /// `member` selects a stored forecast member; when absent one is drawn
    /// from the stored members with `rng`, and only if the forecast branch is
    /// taken.
    #[instrument(skip_all, fields(domain = %domain, lon = lon, lat = lat))]
    pub async fn point_weather<R: Rng + Send>(
        &self,
        domain: &Domain,
        lon: f64,
        lat: f64,
        window: DateRange,
        member: Option<i32>,
        rng: &mut R,
    ) -> Result<PointWeather> {
        let latest = self.latest_historical(domain).await?;

        let (branch, mut series) = if latest >= window.to {
            let series = self
                .store
                .extract
                .series_for_point(domain, self.config.reanalysis, lon, lat, window, &Variable::ALL, None)
                .await?;
            (Branch::EndOfSeason, series)
        } else {
            self.stitch(domain, lon, lat, window, latest, member, rng).await?
        };

        let flipped = to_simulator_units(&mut series);
        if flipped > 0 {
            debug!(flipped, "Made negative rainfall positive");
        }
        check_consistency(&series, lon, lat)?;

        Ok(PointWeather {
            lon,
            lat,
            branch,
            series,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn stitch<R: Rng + Send>(
        &self,
        domain: &Domain,
        lon: f64,
        lat: f64,
        window: DateRange,
        latest: NaiveDate,
        requested: Option<i32>,
        rng: &mut R,
    ) -> Result<(Branch, AlignedSeries)> {
        let tail = DateRange::new(window.from.min(latest - Duration::days(YEAR_DAYS)), latest)?;
        let history = self
            .store
            .extract
            .series_for_point(domain, self.config.reanalysis, lon, lat, tail, &Variable::ALL, None)
            .await?;

        let mut merged = history.clone();
        let mut forecast_days = 0;
        let mut member = None;
        let forecast_table = RasterTable::Series(self.config.forecast, Variable::Rain);
        let stored = if self.store.gateway.table_exists(domain, &forecast_table.name()).await? {
            self.store.gateway.ensemble_members(domain, &forecast_table).await?
        } else {
            Vec::new()
        };
        let horizon = if stored.is_empty() {
            None
        } else {
            self.store.continuity.latest_date(domain, &forecast_table).await?
        };

        match horizon {
            Some(horizon) if horizon > latest => {
                let chosen = choose_member(&stored, self.config.ensemble_members, requested, rng)?;
                member = Some(chosen);
                let until = horizon.min(window.to);
                let model = RadiationModel::train(
                    &history,
                    self.config.knn_neighbors,
                    self.config.smoothing_window_days,
                )?;
                let mut forecast = self
                    .store
                    .extract
                    .series_for_point(
                        domain,
                        self.config.forecast,
                        lon,
                        lat,
                        DateRange::new(latest, until)?,
                        &FORECAST_VARIABLES,
                        Some(chosen),
                    )
                    .await?;
                model.fill(&mut forecast)?;
                forecast_days = forecast.dates().iter().filter(|d| **d > latest).count();
                merged = history.merge_preferring(&forecast)?;
            }
            _ => {
                info!(
                    domain = %domain,
                    latest = %latest,
                    members = stored.len(),
                    "No forecast beyond the historical record"
                );
            }
        }

        let (merged, fallback_days) = fill_from_prior_years(&merged, &history, window.to)?;
        let series = merged.trim(window);
        debug!(
            member = ?member,
            forecast_days,
            fallback_days,
            rows = series.len(),
            "Stitched forecast series"
        );

        let branch = Branch::Forecast {
            member,
            latest_historical: latest,
            forecast_days,
            fallback_days,
        };
        Ok((branch, series))
    }
}

/// Pick the forecast member for one point from the members actually stored.
///
/// A requested member must be stored. Otherwise one is drawn uniformly from
/// the stored members numbered `1..=configured`, or from every stored member
/// when none of them falls in that range.
pub fn choose_member<R: Rng + ?Sized>(
    stored: &[i32],
    configured: i32,
    requested: Option<i32>,
    rng: &mut R,
) -> Result<i32> {
    let missing = |member: i32| EngineError::MissingMember {
        member,
        available: stored.to_vec(),
    };
    if let Some(member) = requested {
        return if stored.contains(&member) {
            Ok(member)
        } else {
            Err(missing(member))
        };
    }

    let in_range: Vec<i32> = stored
        .iter()
        .copied()
        .filter(|m| (1..=configured).contains(m))
        .collect();
    let pool = if in_range.is_empty() { stored } else { &in_range };
    pool.choose(rng).copied().ok_or_else(|| missing(configured))
}

/// Extend `series` to `until` by repeating days of `history` shifted by whole
/// years, taking the smallest shift that lands on a historical date.
/// Returns the extended series and the number of days added.
pub fn fill_from_prior_years(
    series: &AlignedSeries,
    history: &AlignedSeries,
    until: NaiveDate,
) -> Result<(AlignedSeries, usize)> {
    let Some(last) = series.last_date() else {
        return Ok((series.clone(), 0));
    };
    let Some(earliest) = history.first_date() else {
        return Err(EngineError::FallbackGap { date: last });
    };

    let mut rows = series.to_rows();
    let mut added = 0;
    let mut day = last + Duration::days(1);
    while day <= until {
        let mut source = day - Duration::days(YEAR_DAYS);
        let row = loop {
            if source < earliest {
                return Err(EngineError::FallbackGap { date: day });
            }
            if let Some(row) = history.row(source) {
                break row;
            }
            source -= Duration::days(YEAR_DAYS);
        };
        rows.insert(day, row);
        added += 1;
        day += Duration::days(1);
    }

    Ok((AlignedSeries::from_rows(rows)?, added))
}

/// Convert stored units to simulator units in place: Kelvin to Celsius,
/// J/m² to MJ/m², rainfall made non-negative. Returns how many rain values
/// changed sign.
pub fn to_simulator_units(series: &mut AlignedSeries) -> usize {
    for variable in [Variable::Tmax, Variable::Tmin] {
        if let Some(column) = series.column_mut(variable) {
            column.iter_mut().for_each(|v| *v -= KELVIN_OFFSET);
        }
    }
    if let Some(column) = series.column_mut(Variable::Srad) {
        column.iter_mut().for_each(|v| *v /= SRAD_SCALE);
    }

    let mut flipped = 0;
    if let Some(column) = series.column_mut(Variable::Rain) {
        for v in column.iter_mut() {
            if *v < 0.0 {
                *v = -*v;
                flipped += 1;
            }
        }
    }
    flipped
}

/// Reject series with non-finite values or a maximum temperature below the
/// minimum.
pub fn check_consistency(series: &AlignedSeries, lon: f64, lat: f64) -> Result<()> {
    let reject = |date: NaiveDate, reason: String| EngineError::DataQuality {
        lon,
        lat,
        date,
        reason,
    };

    let rows: BTreeMap<NaiveDate, BTreeMap<Variable, f64>> = series.to_rows();
    for (date, row) in rows {
        if let Some((variable, _)) = row.iter().find(|(_, v)| !v.is_finite()) {
            return Err(reject(date, format!("{} is not finite", variable)));
        }
        if let (Some(tmax), Some(tmin)) = (row.get(&Variable::Tmax), row.get(&Variable::Tmin)) {
            if tmax < tmin {
                return Err(reject(date, format!("tmax {:.2} below tmin {:.2}", tmax, tmin)));
            }
        }
    }
    Ok(())
}
