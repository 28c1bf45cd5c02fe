//! Gradient boosted tree ensembles

use super::forest::{average_importances, DEFAULT_N_ESTIMATORS};
use super::tree::{Criterion, DecisionTree};
use crate::error::{Result, TabtrainError};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Default shrinkage applied to each stage.
pub const DEFAULT_LEARNING_RATE: f64 = 0.1;

/// Default depth of each stage tree.
pub const DEFAULT_STAGE_DEPTH: usize = 3;

/// Boosted regression trees fitted to residuals with shrinkage.
///
/// Classification runs one boosted ensemble per class on log-odds
/// (one-vs-rest) and picks the class with the largest score; softmax over
/// the scores serves as the probability estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoosting {
    /// One stage list per class for classification, a single list for
    /// regression.
    stages: Vec<Vec<DecisionTree>>,
    base_scores: Vec<f64>,
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    is_classification: bool,
    classes: Vec<i64>,
    feature_importances: Option<Array1<f64>>,
}

impl GradientBoosting {
    pub fn classifier() -> Self {
        Self::new(true)
    }

    pub fn regressor() -> Self {
        Self::new(false)
    }

    fn new(is_classification: bool) -> Self {
        Self {
            stages: Vec::new(),
            base_scores: Vec::new(),
            n_estimators: DEFAULT_N_ESTIMATORS,
            learning_rate: DEFAULT_LEARNING_RATE,
            max_depth: DEFAULT_STAGE_DEPTH,
            is_classification,
            classes: Vec::new(),
            feature_importances: None,
        }
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n.max(1);
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
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
            return Err(TabtrainError::Data("cannot fit booster on empty matrix".to_string()));
        }

        if self.is_classification {
            let mut classes: Vec<i64> = y.iter().map(|&v| v.round() as i64).collect();
            classes.sort_unstable();
            classes.dedup();
            self.classes = classes;
            self.fit_classification(x, y)?;
        } else {
            self.fit_regression(x, y)?;
        }

        let all_trees: Vec<DecisionTree> = self.stages.iter().flatten().cloned().collect();
        self.feature_importances = average_importances(&all_trees, x.ncols());
        Ok(self)
    }

    fn fit_regression(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let base = y.iter().sum::<f64>() / y.len() as f64;
        self.base_scores = vec![base];

        let mut current = Array1::from_elem(y.len(), base);
        let mut trees = Vec::with_capacity(self.n_estimators);
        for _ in 0..self.n_estimators {
            let residuals = y - &current;
            let mut tree = DecisionTree::new(Criterion::SquaredError)
                .with_max_depth(Some(self.max_depth));
            tree.fit(x, &residuals)?;
            let update = tree.predict(x)?;
            current = current + update.mapv(|v| v * self.learning_rate);
            trees.push(tree);
        }
        self.stages = vec![trees];
        Ok(())
    }

    fn fit_classification(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n = y.len() as f64;
        self.stages = Vec::with_capacity(self.classes.len());
        self.base_scores = Vec::with_capacity(self.classes.len());

        for &class in &self.classes.clone() {
            let targets: Array1<f64> =
                y.mapv(|v| if v.round() as i64 == class { 1.0 } else { 0.0 });
            // Prior log-odds, clamped away from degenerate all-one/all-zero.
            let p = (targets.sum() / n).clamp(1e-10, 1.0 - 1e-10);
            let base = (p / (1.0 - p)).ln();

            let mut score = Array1::from_elem(y.len(), base);
            let mut trees = Vec::with_capacity(self.n_estimators);
            for _ in 0..self.n_estimators {
                let prob = score.mapv(sigmoid);
                let residuals = &targets - &prob;
                let mut tree = DecisionTree::new(Criterion::SquaredError)
                    .with_max_depth(Some(self.max_depth));
                tree.fit(x, &residuals)?;
                let update = tree.predict(x)?;
                score = score + update.mapv(|v| v * self.learning_rate);
                trees.push(tree);
            }
            self.stages.push(trees);
            self.base_scores.push(base);
        }
        Ok(())
    }

    fn raw_scores(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.stages.is_empty() {
            return Err(TabtrainError::NotTrained);
        }
        let mut scores = Array2::zeros((x.nrows(), self.stages.len()));
        for (k, trees) in self.stages.iter().enumerate() {
            let mut col = Array1::from_elem(x.nrows(), self.base_scores[k]);
            for tree in trees {
                let update = tree.predict(x)?;
                col = col + update.mapv(|v| v * self.learning_rate);
            }
            scores.column_mut(k).assign(&col);
        }
        Ok(scores)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let scores = self.raw_scores(x)?;
        if !self.is_classification {
            return Ok(scores.column(0).to_owned());
        }
        let out: Vec<f64> = scores
            .rows()
            .into_iter()
            .map(|row| {
                let best = row
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                self.classes[best] as f64
            })
            .collect();
        Ok(Array1::from_vec(out))
    }

    /// Softmax over per-class scores, columns ordered by ascending class.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_classification {
            return Err(TabtrainError::Data(
                "probabilities are only defined for classification boosters".to_string(),
            ));
        }
        let mut scores = self.raw_scores(x)?;
        for mut row in scores.rows_mut() {
            let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let mut total = 0.0;
            for v in row.iter_mut() {
                *v = (*v - max).exp();
                total += *v;
            }
            for v in row.iter_mut() {
                *v /= total;
            }
        }
        Ok(scores)
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_regressor_converges() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![3.0, 5.0, 7.0, 9.0, 11.0, 13.0];
        let mut gb = GradientBoosting::regressor().with_n_estimators(50);
        gb.fit(&x, &y).unwrap();
        let preds = gb.predict(&x).unwrap();
        let mse: f64 =
            preds.iter().zip(y.iter()).map(|(p, t)| (p - t).powi(2)).sum::<f64>() / y.len() as f64;
        assert!(mse < 1.0, "mse {}", mse);
    }

    #[test]
    fn test_binary_classifier() {
        let x = array![[0.0], [0.2], [0.4], [2.0], [2.2], [2.4]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut gb = GradientBoosting::classifier().with_n_estimators(30);
        gb.fit(&x, &y).unwrap();
        let preds = gb.predict(&x).unwrap();
        assert_eq!(preds, y);
    }

    #[test]
    fn test_proba_rows_sum_to_one() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![0.0, 0.0, 1.0, 1.0, 2.0, 2.0];
        let mut gb = GradientBoosting::classifier().with_n_estimators(10);
        gb.fit(&x, &y).unwrap();
        let proba = gb.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 3);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_predict_before_fit_errors() {
        let gb = GradientBoosting::regressor();
        assert!(gb.predict(&array![[1.0]]).is_err());
    }
}
