//! k-nearest-neighbor models

use crate::error::{Result, TabtrainError};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default neighborhood size.
pub const DEFAULT_K: usize = 5;

/// How neighbor contributions are weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightScheme {
    /// Every neighbor counts equally.
    Uniform,
    /// Neighbors count with weight 1/distance.
    Distance,
}

impl std::str::FromStr for WeightScheme {
    type Err = TabtrainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "uniform" => Ok(WeightScheme::Uniform),
            "distance" => Ok(WeightScheme::Distance),
            other => Err(TabtrainError::Data(format!("unknown weight scheme '{}'", other))),
        }
    }
}

/// Lazy learner: fit stores the training set, predict scans it.
///
/// Distances are Euclidean; exact coincidence with a training point gets a
/// large finite weight under the distance scheme so it dominates without
/// producing infinities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNearestNeighbors {
    x_train: Array2<f64>,
    y_train: Array1<f64>,
    pub k: usize,
    pub weights: WeightScheme,
    is_classification: bool,
    classes: Vec<i64>,
    is_fitted: bool,
}

impl KNearestNeighbors {
    pub fn classifier() -> Self {
        Self::new(true)
    }

    pub fn regressor() -> Self {
        Self::new(false)
    }

    fn new(is_classification: bool) -> Self {
        Self {
            x_train: Array2::zeros((0, 0)),
            y_train: Array1::zeros(0),
            k: DEFAULT_K,
            weights: WeightScheme::Uniform,
            is_classification,
            classes: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k.max(1);
        self
    }

    pub fn with_weights(mut self, weights: WeightScheme) -> Self {
        self.weights = weights;
        self
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        if x.nrows() != y.len() {
            return Err(TabtrainError::Data(format!(
                "x has {} rows but y has {} values",
                x.nrows(),
                y.len()
            )));
        }
        if x.nrows() == 0 {
            return Err(TabtrainError::Data("cannot fit on empty matrix".to_string()));
        }
        self.x_train = x.clone();
        self.y_train = y.clone();
        if self.is_classification {
            let mut classes: Vec<i64> = y.iter().map(|&v| v.round() as i64).collect();
            classes.sort_unstable();
            classes.dedup();
            self.classes = classes;
        }
        self.is_fitted = true;
        Ok(self)
    }

    /// The k nearest training rows as (weight, label) pairs.
    fn neighbors(&self, row: &[f64]) -> Vec<(f64, f64)> {
        let mut dists: Vec<(f64, f64)> = self
            .x_train
            .rows()
            .into_iter()
            .zip(self.y_train.iter())
            .map(|(train_row, &label)| {
                let d: f64 = train_row
                    .iter()
                    .zip(row.iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum::<f64>()
                    .sqrt();
                (d, label)
            })
            .collect();
        dists.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        dists.truncate(self.k.min(dists.len()));

        dists
            .into_iter()
            .map(|(d, label)| {
                let w = match self.weights {
                    WeightScheme::Uniform => 1.0,
                    WeightScheme::Distance => {
                        if d < 1e-12 {
                            1e12
                        } else {
                            1.0 / d
                        }
                    }
                };
                (w, label)
            })
            .collect()
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(TabtrainError::NotTrained);
        }
        let rows: Vec<Vec<f64>> = x.rows().into_iter().map(|r| r.to_vec()).collect();
        let out: Vec<f64> = rows
            .par_iter()
            .map(|row| {
                let neighbors = self.neighbors(row);
                if self.is_classification {
                    let mut votes: HashMap<i64, f64> = HashMap::new();
                    for (w, label) in neighbors {
                        *votes.entry(label.round() as i64).or_insert(0.0) += w;
                    }
                    votes
                        .into_iter()
                        .max_by(|a, b| {
                            a.1.partial_cmp(&b.1)
                                .unwrap_or(std::cmp::Ordering::Equal)
                                .then(b.0.cmp(&a.0))
                        })
                        .map(|(class, _)| class as f64)
                        .unwrap_or(0.0)
                } else {
                    let total_w: f64 = neighbors.iter().map(|(w, _)| w).sum();
                    if total_w == 0.0 {
                        0.0
                    } else {
                        neighbors.iter().map(|(w, label)| w * label).sum::<f64>() / total_w
                    }
                }
            })
            .collect();
        Ok(Array1::from_vec(out))
    }

    /// Weighted vote fractions per class, ordered by ascending class.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(TabtrainError::NotTrained);
        }
        if !self.is_classification {
            return Err(TabtrainError::Data(
                "probabilities are only defined for classification".to_string(),
            ));
        }
        let mut proba = Array2::zeros((x.nrows(), self.classes.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            let row = row.to_vec();
            for (w, label) in self.neighbors(&row) {
                if let Some(j) = self.classes.iter().position(|&c| c == label.round() as i64) {
                    proba[[i, j]] += w;
                }
            }
            let total: f64 = proba.row(i).sum();
            if total > 0.0 {
                for j in 0..self.classes.len() {
                    proba[[i, j]] /= total;
                }
            }
        }
        Ok(proba)
    }
}
