//! Ingestion configuration.

use std::path::PathBuf;

use agro_common::Dataset;
use serde::{Deserialize, Serialize};

use crate::error::{IngestionError, Result};

/// Settings shared by the ingestion loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Root of the directory-backed tile source.
    pub source_root: PathBuf,
    /// Envelope padding for reanalysis fetches, degrees.
    pub envelope_pad_deg: f64,
    /// Envelope padding for forecast fetches, degrees.
    pub forecast_envelope_pad_deg: f64,
    /// Forecast members are numbered `1..=ensemble_members`.
    pub ensemble_members: i32,
    /// Dataset whose climatology drives forecast bias correction.
    pub climatology_dataset: Dataset,
    /// Property of the boundary features naming the administrative unit.
    pub admin1_field: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            source_root: PathBuf::from("./data"),
            envelope_pad_deg: 0.1,
            forecast_envelope_pad_deg: 1.0,
            ensemble_members: 10,
            climatology_dataset: Dataset::Era5,
            admin1_field: "admin1".to_string(),
        }
    }
}

impl IngestionConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SOURCE_ROOT") {
            config.source_root = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("ENVELOPE_PAD_DEG") {
            if let Ok(pad) = val.parse() {
                config.envelope_pad_deg = pad;
            }
        }

        if let Ok(val) = std::env::var("FORECAST_ENVELOPE_PAD_DEG") {
            if let Ok(pad) = val.parse() {
                config.forecast_envelope_pad_deg = pad;
            }
        }

        if let Ok(val) = std::env::var("ENSEMBLE_MEMBERS") {
            if let Ok(n) = val.parse() {
                config.ensemble_members = n;
            }
        }

        if let Ok(val) = std::env::var("CLIMATOLOGY_DATASET") {
            if let Ok(dataset) = val.parse() {
                config.climatology_dataset = dataset;
            }
        }

        if let Ok(val) = std::env::var("ADMIN1_FIELD") {
            config.admin1_field = val;
        }

        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.ensemble_members < 1 {
            return Err(IngestionError::InvalidConfig(format!(
                "ensemble_members must be at least 1, got {}",
                self.ensemble_members
            )));
        }
        if self.envelope_pad_deg < 0.0 || self.forecast_envelope_pad_deg < 0.0 {
            return Err(IngestionError::InvalidConfig(
                "envelope padding cannot be negative".to_string(),
            ));
        }
        if self.climatology_dataset.kind() != agro_common::DatasetKind::Reanalysis {
            return Err(IngestionError::InvalidConfig(format!(
                "climatology dataset {} is not a reanalysis",
                self.climatology_dataset
            )));
        }
        Ok(())
    }

    /// Forecast member ids to ingest.
    pub fn members(&self) -> std::ops::RangeInclusive<i32> {
        1..=self.ensemble_members
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IngestionConfig::default();
        assert_eq!(config.members().count(), 10);
        assert_eq!(config.forecast_envelope_pad_deg, 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_forecast_climatology_is_rejected() {
        let config = IngestionConfig {
            climatology_dataset: Dataset::Nmme,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(IngestionError::InvalidConfig(_))));
    }
}
