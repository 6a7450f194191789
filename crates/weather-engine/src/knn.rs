//! K-nearest-neighbour regression with uniform weights.

use std::cmp::Ordering;

use crate::error::{EngineError, Result};

/// Regressor over `D`-dimensional features.
///
/// Prediction is the plain mean of the targets of the `k` training rows
/// closest to the query in Euclidean distance. Equal distances resolve to
/// the earlier training row.
#[derive(Debug, Clone)]
pub struct KnnRegressor<const D: usize> {
    k: usize,
    features: Vec<[f64; D]>,
    targets: Vec<f64>,
}

impl<const D: usize> KnnRegressor<D> {
    /// Fit on paired rows. `k` is capped at the number of rows.
    pub fn fit(features: Vec<[f64; D]>, targets: Vec<f64>, k: usize) -> Result<Self> {
        if features.len() != targets.len() {
            return Err(EngineError::fit(format!(
                "{} feature rows for {} targets",
                features.len(),
                targets.len()
            )));
        }
        if features.is_empty() {
            return Err(EngineError::InsufficientTraining { needed: 1, found: 0 });
        }
        if k == 0 {
            return Err(EngineError::fit("k must be at least 1"));
        }
        if features.iter().flatten().chain(targets.iter()).any(|v| !v.is_finite()) {
            return Err(EngineError::fit("training data contains non-finite values"));
        }
        Ok(Self {
            k: k.min(features.len()),
            features,
            targets,
        })
    }

    /// Neighbours used per prediction.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Indices of the `k` nearest training rows, nearest first.
    pub fn neighbours(&self, query: &[f64; D]) -> Vec<usize> {
        let mut pairs: Vec<(f64, usize)> = self
            .features
            .iter()
            .enumerate()
            .map(|(i, row)| (squared_distance(row, query), i))
            .collect();
        pairs.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        pairs.truncate(self.k);
        pairs.into_iter().map(|(_, i)| i).collect()
    }

    pub fn predict(&self, query: &[f64; D]) -> f64 {
        let neighbours = self.neighbours(query);
        neighbours.iter().map(|i| self.targets[*i]).sum::<f64>() / neighbours.len() as f64
    }
}

fn squared_distance<const D: usize>(a: &[f64; D], b: &[f64; D]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}
