//! Engine configuration.

use agro_common::{Dataset, DatasetKind};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Settings for weather reconstruction and ensemble sampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fewest soil points a sub-region must offer before a mask is relaxed.
    pub min_samples: usize,
    /// Days simulated after planting.
    pub max_sim_length_days: i64,
    /// Days simulated before planting.
    pub spinup_days: i64,
    /// Sample pairs drawn per ensemble.
    pub ensemble_size: usize,
    /// Neighbours averaged by the radiation residual model.
    pub knn_neighbors: usize,
    /// Rolling mean window applied before the harmonic fit, days.
    pub smoothing_window_days: usize,
    /// Historical source of every variable.
    pub reanalysis: Dataset,
    /// Forecast ensemble used beyond the historical record.
    pub forecast: Dataset,
    /// Forecast members are numbered `1..=ensemble_members`.
    pub ensemble_members: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_samples: 4,
            max_sim_length_days: 360,
            spinup_days: 30,
            ensemble_size: 50,
            knn_neighbors: 5,
            smoothing_window_days: 15,
            reanalysis: Dataset::Era5,
            forecast: Dataset::Nmme,
            ensemble_members: 10,
        }
    }
}

impl EngineConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("MIN_SAMPLES") {
            if let Ok(n) = val.parse() {
                config.min_samples = n;
            }
        }

        if let Ok(val) = std::env::var("MAX_SIM_LENGTH_DAYS") {
            if let Ok(days) = val.parse() {
                config.max_sim_length_days = days;
            }
        }

        if let Ok(val) = std::env::var("SPINUP_DAYS") {
            if let Ok(days) = val.parse() {
                config.spinup_days = days;
            }
        }

        if let Ok(val) = std::env::var("ENSEMBLE_SIZE") {
            if let Ok(n) = val.parse() {
                config.ensemble_size = n;
            }
        }

        if let Ok(val) = std::env::var("KNN_NEIGHBORS") {
            if let Ok(k) = val.parse() {
                config.knn_neighbors = k;
            }
        }

        if let Ok(val) = std::env::var("SMOOTHING_WINDOW_DAYS") {
            if let Ok(days) = val.parse() {
                config.smoothing_window_days = days;
            }
        }

        if let Ok(val) = std::env::var("REANALYSIS_DATASET") {
            if let Ok(dataset) = val.parse() {
                config.reanalysis = dataset;
            }
        }

        if let Ok(val) = std::env::var("ENSEMBLE_MEMBERS") {
            if let Ok(n) = val.parse() {
                config.ensemble_members = n;
            }
        }

        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_samples == 0 || self.ensemble_size == 0 {
            return Err(EngineError::InvalidConfig(
                "min_samples and ensemble_size must be positive".to_string(),
            ));
        }
        if self.knn_neighbors == 0 || self.smoothing_window_days == 0 {
            return Err(EngineError::InvalidConfig(
                "knn_neighbors and smoothing_window_days must be positive".to_string(),
            ));
        }
        if self.spinup_days < 0 || self.max_sim_length_days < 0 {
            return Err(EngineError::InvalidConfig(
                "simulation window lengths cannot be negative".to_string(),
            ));
        }
        if self.ensemble_members < 1 {
            return Err(EngineError::InvalidConfig(format!(
                "ensemble_members must be at least 1, got {}",
                self.ensemble_members
            )));
        }
        if self.reanalysis.kind() != DatasetKind::Reanalysis {
            return Err(EngineError::InvalidConfig(format!(
                "{} is not a reanalysis dataset",
                self.reanalysis
            )));
        }
        if self.forecast.kind() != DatasetKind::Forecast {
            return Err(EngineError::InvalidConfig(format!(
                "{} is not a forecast dataset",
                self.forecast
            )));
        }
        Ok(())
    }
}
