//! Weather variables, source datasets and climatology statistic names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GridError;

/// Offset between Celsius and Kelvin.
pub const KELVIN_OFFSET: f64 = 273.15;

/// Daily weather variable stored as one raster series per dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variable {
    Tmax,
    Tmin,
    Rain,
    Srad,
}

impl Variable {
    pub const ALL: [Variable; 4] = [
        Variable::Tmax,
        Variable::Tmin,
        Variable::Rain,
        Variable::Srad,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variable::Tmax => "tmax",
            Variable::Tmin => "tmin",
            Variable::Rain => "rain",
            Variable::Srad => "srad",
        }
    }

    pub fn is_temperature(&self) -> bool {
        matches!(self, Variable::Tmax | Variable::Tmin)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variable {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tmax" => Ok(Variable::Tmax),
            "tmin" => Ok(Variable::Tmin),
            "rain" => Ok(Variable::Rain),
            "srad" => Ok(Variable::Srad),
            _ => Err(GridError::UnknownVariable(s.to_string())),
        }
    }
}

/// Whether a dataset carries one slice per date or one per (date, member).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    Reanalysis,
    Forecast,
}

/// Upstream gridded product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    /// Global reanalysis, temperatures in Kelvin.
    Era5,
    /// Regional reanalysis, temperatures in Celsius, no radiation.
    Prism,
    /// Coarse forecast ensemble, no radiation.
    Nmme,
}

impl Dataset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::Era5 => "era5",
            Dataset::Prism => "prism",
            Dataset::Nmme => "nmme",
        }
    }

    pub fn kind(&self) -> DatasetKind {
        match self {
            Dataset::Era5 | Dataset::Prism => DatasetKind::Reanalysis,
            Dataset::Nmme => DatasetKind::Forecast,
        }
    }

    /// Variables stored for this dataset.
    pub fn variables(&self) -> &'static [Variable] {
        match self {
            Dataset::Era5 | Dataset::Prism => &Variable::ALL,
            Dataset::Nmme => &[Variable::Tmax, Variable::Tmin, Variable::Rain],
        }
    }

    /// Variables fetched from this dataset's own upstream source.
    pub fn native_variables(&self) -> &'static [Variable] {
        match self {
            Dataset::Era5 => &Variable::ALL,
            Dataset::Prism | Dataset::Nmme => &[Variable::Tmax, Variable::Tmin, Variable::Rain],
        }
    }

    /// Dataset that supplies radiation when this one lacks it.
    pub fn srad_donor(&self) -> Option<Dataset> {
        match self {
            Dataset::Prism => Some(Dataset::Era5),
            _ => None,
        }
    }

    /// Additive offset applied to extracted values so every dataset reports
    /// temperatures in Kelvin.
    pub fn extraction_offset(&self, variable: Variable) -> f64 {
        match (self, variable.is_temperature()) {
            (Dataset::Prism, true) => KELVIN_OFFSET,
            _ => 0.0,
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dataset {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "era5" => Ok(Dataset::Era5),
            "prism" => Ok(Dataset::Prism),
            "nmme" => Ok(Dataset::Nmme),
            _ => Err(GridError::UnknownDataset(s.to_string())),
        }
    }
}

/// Name of a climatology row: a monthly aggregate of one quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClimatologyStat {
    /// Monthly mean of a base variable, `{var}_mean`.
    Mean(Variable),
    /// Mean of the tmax and tmin monthly means.
    TmeanMean,
    /// Monthly range of the daily mean temperature.
    TmeanRange,
    /// Monthly mean of the daily temperature range.
    TrangeMean,
    /// Monthly range of the daily temperature range.
    TrangeRange,
}

impl ClimatologyStat {
    pub const DERIVED: [ClimatologyStat; 4] = [
        ClimatologyStat::TmeanMean,
        ClimatologyStat::TmeanRange,
        ClimatologyStat::TrangeMean,
        ClimatologyStat::TrangeRange,
    ];

    pub fn name(&self) -> String {
        match self {
            ClimatologyStat::Mean(v) => format!("{}_mean", v),
            ClimatologyStat::TmeanMean => "tmean_mean".to_string(),
            ClimatologyStat::TmeanRange => "tmean_range".to_string(),
            ClimatologyStat::TrangeMean => "trange_mean".to_string(),
            ClimatologyStat::TrangeRange => "trange_range".to_string(),
        }
    }
}

impl fmt::Display for ClimatologyStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for ClimatologyStat {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tmean_mean" => Ok(ClimatologyStat::TmeanMean),
            "tmean_range" => Ok(ClimatologyStat::TmeanRange),
            "trange_mean" => Ok(ClimatologyStat::TrangeMean),
            "trange_range" => Ok(ClimatologyStat::TrangeRange),
            other => match other.strip_suffix("_mean") {
                Some(var) => Ok(ClimatologyStat::Mean(var.parse()?)),
                None => Err(GridError::UnknownStatistic(s.to_string())),
            },
        }
    }
}
