//! Reductions used for raster unions and monthly aggregates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GridError;

/// Cell-wise reduction applied when collapsing a stack of grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    Mean,
    Range,
    Min,
    Max,
    Sum,
}

impl Statistic {
    /// Union type name understood by `ST_Union(raster, uniontype)`.
    pub fn sql_name(&self) -> &'static str {
        match self {
            Statistic::Mean => "MEAN",
            Statistic::Range => "RANGE",
            Statistic::Min => "MIN",
            Statistic::Max => "MAX",
            Statistic::Sum => "SUM",
        }
    }

    /// Reduce a set of values. `None` for an empty set.
    pub fn reduce(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let min = || values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = || values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let sum: f64 = values.iter().sum();
        Some(match self {
            Statistic::Mean => sum / values.len() as f64,
            Statistic::Range => max() - min(),
            Statistic::Min => min(),
            Statistic::Max => max(),
            Statistic::Sum => sum,
        })
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_name().to_lowercase())
    }
}

impl FromStr for Statistic {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(Statistic::Mean),
            "range" => Ok(Statistic::Range),
            "min" => Ok(Statistic::Min),
            "max" => Ok(Statistic::Max),
            "sum" => Ok(Statistic::Sum),
            _ => Err(GridError::UnknownStatistic(s.to_string())),
        }
    }
}
