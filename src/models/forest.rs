//! Random forest ensembles

use super::tree::{Criterion, DecisionTree};
use crate::error::{Result, TabtrainError};
use ndarray::{Array1, Array2, Axis};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default ensemble size, shared with gradient boosting.
pub const DEFAULT_N_ESTIMATORS: usize = 100;

/// Bagged trees with per-tree bootstrap resampling. Classification
/// aggregates by majority vote, regression by mean; probabilities are vote
/// fractions over the ensemble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub seed: u64,
    is_classification: bool,
    classes: Vec<i64>,
    feature_importances: Option<Array1<f64>>,
}

impl RandomForest {
    pub fn classifier() -> Self {
        Self::new(true)
    }

    pub fn regressor() -> Self {
        Self::new(false)
    }

    fn new(is_classification: bool) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators: DEFAULT_N_ESTIMATORS,
            max_depth: None,
            min_samples_split: 2,
            seed: 42,
            is_classification,
            classes: Vec::new(),
            feature_importances: None,
        }
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n.max(1);
        self
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
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
        let n_samples = x.nrows();
        if n_samples == 0 {
            return Err(TabtrainError::Data("cannot fit forest on empty matrix".to_string()));
        }

        if self.is_classification {
            let mut classes: Vec<i64> = y.iter().map(|&v| v.round() as i64).collect();
            classes.sort_unstable();
            classes.dedup();
            self.classes = classes;
        }

        let criterion = if self.is_classification {
            Criterion::Gini
        } else {
            Criterion::SquaredError
        };

        let base_seed = self.seed;
        let trees: Result<Vec<DecisionTree>> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));
                let sample_idx: Vec<usize> = (0..n_samples)
                    .map(|_| (rng.next_u64() as usize) % n_samples)
                    .collect();
                let x_boot = x.select(Axis(0), &sample_idx);
                let y_boot = Array1::from_iter(sample_idx.iter().map(|&i| y[i]));

                let mut tree = DecisionTree::new(criterion)
                    .with_max_depth(self.max_depth)
                    .with_min_samples_split(self.min_samples_split);
                tree.fit(&x_boot, &y_boot)?;
                Ok(tree)
            })
            .collect();
        self.trees = trees?;

        self.feature_importances = average_importances(&self.trees, x.ncols());
        Ok(self)
    }

    fn tree_predictions(&self, x: &Array2<f64>) -> Result<Vec<Array1<f64>>> {
        if self.trees.is_empty() {
            return Err(TabtrainError::NotTrained);
        }
        self.trees.par_iter().map(|t| t.predict(x)).collect()
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let all = self.tree_predictions(x)?;
        let out: Vec<f64> = (0..x.nrows())
            .map(|i| {
                if self.is_classification {
                    let mut votes: HashMap<i64, usize> = HashMap::new();
                    for preds in &all {
                        *votes.entry(preds[i].round() as i64).or_insert(0) += 1;
                    }
                    votes
                        .into_iter()
                        .max_by_key(|&(class, count)| (count, std::cmp::Reverse(class)))
                        .map(|(class, _)| class as f64)
                        .unwrap_or(0.0)
                } else {
                    all.iter().map(|p| p[i]).sum::<f64>() / all.len() as f64
                }
            })
            .collect();
        Ok(Array1::from_vec(out))
    }

    /// Vote fractions per class, columns ordered by ascending class index.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_classification {
            return Err(TabtrainError::Data(
                "probabilities are only defined for classification forests".to_string(),
            ));
        }
        let all = self.tree_predictions(x)?;
        let n_classes = self.classes.len();
        let mut proba = Array2::zeros((x.nrows(), n_classes));
        for i in 0..x.nrows() {
            for preds in &all {
                let class = preds[i].round() as i64;
                if let Some(j) = self.classes.iter().position(|&c| c == class) {
                    proba[[i, j]] += 1.0;
                }
            }
            let total: f64 = proba.row(i).sum();
            if total > 0.0 {
                for j in 0..n_classes {
                    proba[[i, j]] /= total;
                }
            }
        }
        Ok(proba)
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

pub(super) fn average_importances(trees: &[DecisionTree], n_features: usize) -> Option<Array1<f64>> {
    if trees.is_empty() {
        return None;
    }
    let mut total = vec![0.0; n_features];
    for tree in trees {
        if let Some(imp) = tree.feature_importances() {
            for (slot, &v) in total.iter_mut().zip(imp.iter()) {
                *slot += v;
            }
        }
    }
    let sum: f64 = total.iter().sum();
    if sum > 0.0 {
        for v in &mut total {
            *v /= sum;
        }
    }
    Some(Array1::from_vec(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable() -> (Array2<f64>, Array1<f64>) {
        (
            array![
                [0.0, 0.0],
                [0.1, 0.2],
                [0.2, 0.1],
                [1.0, 1.0],
                [1.1, 0.9],
                [0.9, 1.1],
            ],
            array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        )
    }

    #[test]
    fn test_classifier_accuracy() {
        let (x, y) = separable();
        let mut rf = RandomForest::classifier().with_n_estimators(20);
        rf.fit(&x, &y).unwrap();
        let preds = rf.predict(&x).unwrap();
        let correct = preds.iter().zip(y.iter()).filter(|(p, t)| (*p - *t).abs() < 0.5).count();
        assert!(correct >= 5);
    }

    #[test]
    fn test_proba_rows_sum_to_one() {
        let (x, y) = separable();
        let mut rf = RandomForest::classifier().with_n_estimators(15);
        rf.fit(&x, &y).unwrap();
        let proba = rf.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 2);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_regressor_fit() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![2.0, 4.0, 6.0, 8.0, 10.0, 12.0];
        let mut rf = RandomForest::regressor().with_n_estimators(20);
        rf.fit(&x, &y).unwrap();
        let preds = rf.predict(&x).unwrap();
        let mse: f64 =
            preds.iter().zip(y.iter()).map(|(p, t)| (p - t).powi(2)).sum::<f64>() / y.len() as f64;
        assert!(mse < 5.0);
    }

    #[test]
    fn test_same_seed_deterministic() {
        let (x, y) = separable();
        let mut a = RandomForest::classifier().with_n_estimators(10).with_seed(7);
        let mut b = RandomForest::classifier().with_n_estimators(10).with_seed(7);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_proba_rejected_for_regressor() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![1.0, 2.0, 3.0];
        let mut rf = RandomForest::regressor().with_n_estimators(5);
        rf.fit(&x, &y).unwrap();
        assert!(rf.predict_proba(&x).is_err());
    }
}
