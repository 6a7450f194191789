//! Solar radiation model: seasonal harmonic plus nearest-neighbour residual.
//!
//! Trained on the historical record at one point. The harmonic is fitted to
//! a rolling mean of observed radiation; the residual (observed minus
//! harmonic) is regressed on `(cos 2πt, rainfall)`. Forecast days get the
//! harmonic value plus the predicted residual.

use std::f64::consts::PI;

use agro_common::time::year_fraction;
use agro_common::{AlignedSeries, Variable};
use chrono::NaiveDate;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::harmonic::HarmonicFit;
use crate::knn::KnnRegressor;
use crate::smoothing::centred_rolling_mean;

#[derive(Debug, Clone)]
pub struct RadiationModel {
    harmonic: HarmonicFit,
    residuals: KnnRegressor<2>,
}

fn features(date: NaiveDate, rain: f64) -> [f64; 2] {
    [(2.0 * PI * year_fraction(date)).cos(), rain]
}

fn required<'a>(series: &'a AlignedSeries, variable: Variable) -> Result<&'a [f64]> {
    series
        .column(variable)
        .ok_or_else(|| EngineError::fit(format!("series has no {} column", variable)))
}

impl RadiationModel {
    /// Train on a series carrying `srad` and `rain`.
    pub fn train(history: &AlignedSeries, neighbours: usize, smoothing_window: usize) -> Result<Self> {
        let srad = required(history, Variable::Srad)?;
        let rain = required(history, Variable::Rain)?;
        let dates = history.dates();

        let smoothed = centred_rolling_mean(srad, smoothing_window);
        let harmonic = HarmonicFit::fit(dates, &smoothed)?;

        let residuals: Vec<f64> = dates
            .iter()
            .zip(srad)
            .map(|(d, observed)| observed - harmonic.predict(*d))
            .collect();
        let rows: Vec<[f64; 2]> = dates
            .iter()
            .zip(rain)
            .map(|(d, r)| features(*d, *r))
            .collect();
        let residuals = KnnRegressor::fit(rows, residuals, neighbours)?;

        debug!(
            rows = dates.len(),
            amplitude = harmonic.annual_amplitude(),
            "Trained radiation model"
        );
        Ok(Self { harmonic, residuals })
    }

    pub fn harmonic(&self) -> &HarmonicFit {
        &self.harmonic
    }

    pub fn predict(&self, date: NaiveDate, rain: f64) -> f64 {
        self.harmonic.predict(date) + self.residuals.predict(&features(date, rain))
    }

    /// Add (or replace) the `srad` column of `series` from its `rain` column.
    pub fn fill(&self, series: &mut AlignedSeries) -> Result<()> {
        let rain = required(series, Variable::Rain)?;
        let srad: Vec<f64> = series
            .dates()
            .iter()
            .zip(rain)
            .map(|(d, r)| self.predict(*d, *r))
            .collect();
        series.insert_column(Variable::Srad, srad)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agro_common::DateRange;
    use test_utils::{create_daily_weather, date, HarmonicSignal};

    #[test]
    fn test_noise_free_history_is_reproduced() {
        let range = DateRange::new(date(2021, 1, 1), date(2022, 12, 31)).unwrap();
        let history = create_daily_weather(range, 3, 0.0);
        let model = RadiationModel::train(&history, 5, 1).unwrap();

        let signal = HarmonicSignal::radiation();
        for day in [date(2023, 2, 1), date(2023, 7, 15), date(2023, 11, 30)] {
            let got = model.predict(day, 0.0);
            assert!((got - signal.value(day)).abs() < 1.0, "{} on {}", got, day);
        }
    }

    #[test]
    fn test_fill_adds_srad() {
        let range = DateRange::new(date(2022, 1, 1), date(2022, 12, 31)).unwrap();
        let history = create_daily_weather(range, 5, 0.2e6);
        let model = RadiationModel::train(&history, 5, 15).unwrap();

        let mut forecast = AlignedSeries::new(vec![date(2023, 3, 1), date(2023, 3, 2)]);
        forecast.insert_column(Variable::Rain, vec![0.0, 12.0]).unwrap();
        model.fill(&mut forecast).unwrap();
        let srad = forecast.column(Variable::Srad).unwrap();
        assert_eq!(srad.len(), 2);
        assert_eq!(srad[1], model.predict(date(2023, 3, 2), 12.0));
    }

    #[test]
    fn test_history_without_srad_is_rejected() {
        let mut history = AlignedSeries::new(vec![date(2022, 1, 1)]);
        history.insert_column(Variable::Rain, vec![0.0]).unwrap();
        assert!(matches!(
            RadiationModel::train(&history, 5, 15),
            Err(EngineError::Fit(_))
        ));
    }
}
