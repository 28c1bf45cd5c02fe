//! Linear models: least-squares regression and logistic classification

use crate::error::{Result, TabtrainError};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Linear least squares with a small ridge term for numeric stability.
///
/// Solved in closed form via the normal equations; the augmented system is
/// small (features x features) so Gaussian elimination is plenty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    coefficients: Array1<f64>,
    intercept: f64,
    pub alpha: f64,
    is_fitted: bool,
}

impl LinearRegression {
    pub fn new() -> Self {
        Self {
            coefficients: Array1::zeros(0),
            intercept: 0.0,
            alpha: 1e-8,
            is_fitted: false,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
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
        let n = x.nrows();
        let d = x.ncols() + 1;

        // Augment with a bias column, then solve (A'A + aI) w = A'y.
        let mut ata = vec![vec![0.0; d]; d];
        let mut aty = vec![0.0; d];
        for i in 0..n {
            let mut row = Vec::with_capacity(d);
            row.push(1.0);
            row.extend(x.row(i).iter().copied());
            for j in 0..d {
                aty[j] += row[j] * y[i];
                for k in 0..d {
                    ata[j][k] += row[j] * row[k];
                }
            }
        }
        for (j, row) in ata.iter_mut().enumerate() {
            row[j] += self.alpha;
        }

        let solution = solve_linear_system(ata, aty)?;
        self.intercept = solution[0];
        self.coefficients = Array1::from_iter(solution[1..].iter().copied());
        self.is_fitted = true;
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(TabtrainError::NotTrained);
        }
        if x.ncols() != self.coefficients.len() {
            return Err(TabtrainError::Schema(format!(
                "expected {} feature columns, got {}",
                self.coefficients.len(),
                x.ncols()
            )));
        }
        Ok(x.dot(&self.coefficients) + self.intercept)
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

/// Multinomial logistic regression trained by full-batch gradient descent.
///
/// A single weight matrix with softmax output covers both the binary and
/// the multiclass case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// (features, classes) weight matrix.
    weights: Array2<f64>,
    bias: Array1<f64>,
    classes: Vec<i64>,
    pub learning_rate: f64,
    pub max_iter: usize,
    pub tolerance: f64,
    is_fitted: bool,
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            weights: Array2::zeros((0, 0)),
            bias: Array1::zeros(0),
            classes: Vec::new(),
            learning_rate: 0.1,
            max_iter: 500,
            tolerance: 1e-6,
            is_fitted: false,
        }
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
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
        let n = x.nrows();
        if n == 0 {
            return Err(TabtrainError::Data("cannot fit on empty matrix".to_string()));
        }

        let mut classes: Vec<i64> = y.iter().map(|&v| v.round() as i64).collect();
        classes.sort_unstable();
        classes.dedup();
        self.classes = classes;
        let k = self.classes.len();

        let mut onehot = Array2::zeros((n, k));
        for (i, &v) in y.iter().enumerate() {
            let class = v.round() as i64;
            if let Some(j) = self.classes.iter().position(|&c| c == class) {
                onehot[[i, j]] = 1.0;
            }
        }

        self.weights = Array2::zeros((x.ncols(), k));
        self.bias = Array1::zeros(k);

        let mut prev_loss = f64::INFINITY;
        for _ in 0..self.max_iter {
            let probs = softmax_rows(&(x.dot(&self.weights) + &self.bias));
            let diff = &probs - &onehot;
            let grad_w = x.t().dot(&diff) / n as f64;
            let grad_b = diff.sum_axis(Axis(0)) / n as f64;
            self.weights = &self.weights - &grad_w.mapv(|v| v * self.learning_rate);
            self.bias = &self.bias - &grad_b.mapv(|v| v * self.learning_rate);

            let loss = -onehot
                .iter()
                .zip(probs.iter())
                .map(|(&t, &p)| t * p.max(1e-15).ln())
                .sum::<f64>()
                / n as f64;
            if (prev_loss - loss).abs() < self.tolerance {
                break;
            }
            prev_loss = loss;
        }
        self.is_fitted = true;
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        let out: Vec<f64> = proba
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

    /// Softmax class probabilities, columns ordered by ascending class.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(TabtrainError::NotTrained);
        }
        if x.ncols() != self.weights.nrows() {
            return Err(TabtrainError::Schema(format!(
                "expected {} feature columns, got {}",
                self.weights.nrows(),
                x.ncols()
            )));
        }
        Ok(softmax_rows(&(x.dot(&self.weights) + &self.bias)))
    }
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

fn softmax_rows(scores: &Array2<f64>) -> Array2<f64> {
    let mut out = scores.clone();
    for mut row in out.rows_mut() {
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
    out
}

/// Gaussian elimination with partial pivoting.
fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| {
                a[i][col]
                    .abs()
                    .partial_cmp(&a[j][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            return Err(TabtrainError::NumericFit(
                "singular system in least-squares solve".to_string(),
            ));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut acc = b[row];
        for k in (row + 1)..n {
            acc -= a[row][k] * x[k];
        }
        x[row] = acc / a[row][row];
    }
    Ok(x)
}
