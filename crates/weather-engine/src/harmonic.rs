//! Seasonal harmonic regression over the day of year.
//!
//! The model is `c0 + c1 cos 2πt + c2 sin 2πt + c3 cos πt + c4 sin πt` with
//! `t` the day of year over 365, fitted by least squares through an SVD.

use std::f64::consts::PI;

use agro_common::time::year_fraction;
use chrono::NaiveDate;
use nalgebra::{DMatrix, DVector};

use crate::error::{EngineError, Result};

/// Number of predictors, constant term included.
pub const TERMS: usize = 5;

const RANK_EPS: f64 = 1e-9;

/// Predictor row for one date.
pub fn predictors(date: NaiveDate) -> [f64; TERMS] {
    let t = year_fraction(date);
    [
        1.0,
        (2.0 * PI * t).cos(),
        (2.0 * PI * t).sin(),
        (PI * t).cos(),
        (PI * t).sin(),
    ]
}

/// Fitted coefficients of the seasonal model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicFit {
    pub coefficients: [f64; TERMS],
}

impl HarmonicFit {
    /// Least-squares fit of `values` observed on `dates`.
    pub fn fit(dates: &[NaiveDate], values: &[f64]) -> Result<Self> {
        if dates.len() != values.len() {
            return Err(EngineError::fit(format!(
                "{} dates for {} values",
                dates.len(),
                values.len()
            )));
        }
        if dates.len() < TERMS {
            return Err(EngineError::InsufficientTraining {
                needed: TERMS,
                found: dates.len(),
            });
        }

        let rows: Vec<[f64; TERMS]> = dates.iter().map(|d| predictors(*d)).collect();
        let x = DMatrix::from_fn(rows.len(), TERMS, |i, j| rows[i][j]);
        let y = DVector::from_column_slice(values);

        let svd = x.svd(true, true);
        if svd.rank(RANK_EPS) < TERMS {
            return Err(EngineError::fit(
                "training dates do not determine every harmonic term",
            ));
        }
        let beta = svd.solve(&y, RANK_EPS).map_err(EngineError::fit)?;

        let mut coefficients = [0.0; TERMS];
        for (c, b) in coefficients.iter_mut().zip(beta.iter()) {
            *c = *b;
        }
        Ok(Self { coefficients })
    }

    pub fn predict(&self, date: NaiveDate) -> f64 {
        predictors(date)
            .iter()
            .zip(self.coefficients.iter())
            .map(|(p, c)| p * c)
            .sum()
    }

    /// Amplitude of the annual cycle.
    pub fn annual_amplitude(&self) -> f64 {
        self.coefficients[1].hypot(self.coefficients[2])
    }

    /// Phase of the annual cycle, radians.
    pub fn annual_phase(&self) -> f64 {
        self.coefficients[2].atan2(self.coefficients[1])
    }
}
