//! Standard (z-score) feature scaling over encoded matrices

use crate::error::{Result, TabtrainError};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Per-column standardization: (x - mean) / std.
///
/// Statistics are captured once, from the training partition only; every
/// later transform (validation, test, inference) reuses them, so held-out
/// data never leaks into the fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    std: Array1<f64>,
    is_fitted: bool,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self {
            mean: Array1::zeros(0),
            std: Array1::zeros(0),
            is_fitted: false,
        }
    }

    /// Fit on the training matrix.
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        if x.nrows() == 0 {
            return Err(TabtrainError::Data("cannot fit scaler on empty matrix".to_string()));
        }
        let n = x.nrows() as f64;
        self.mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let mut var: Array1<f64> = Array1::zeros(x.ncols());
        for row in x.rows() {
            for (j, &v) in row.iter().enumerate() {
                let d = v - self.mean[j];
                var[j] += d * d;
            }
        }
        // Constant columns scale by 1.0 so they pass through centered.
        self.std = var.mapv(|v| {
            let s = (v / n).sqrt();
            if s == 0.0 { 1.0 } else { s }
        });
        self.is_fitted = true;
        Ok(self)
    }

    /// Transform a matrix using the stored training statistics.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(TabtrainError::NotTrained);
        }
        if x.ncols() != self.mean.len() {
            return Err(TabtrainError::Schema(format!(
                "expected {} feature columns, got {}",
                self.mean.len(),
                x.ncols()
            )));
        }
        let mut out = x.clone();
        for mut row in out.rows_mut() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = (*v - self.mean[j]) / self.std[j];
            }
        }
        Ok(out)
    }

    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Stored per-column means (training partition).
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Stored per-column standard deviations (training partition).
    pub fn std(&self) -> &Array1<f64> {
        &self.std
    }
}

impl Default for StandardScaler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_train_stats_zero_mean_unit_std() {
        let x = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]];
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&x).unwrap();

        for j in 0..2 {
            let col = scaled.column(j);
            let mean: f64 = col.iter().sum::<f64>() / col.len() as f64;
            let var: f64 = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / col.len() as f64;
            assert!(mean.abs() < 1e-10);
            assert!((var.sqrt() - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_test_transform_uses_train_stats() {
        let train = array![[0.0], [2.0], [4.0]];
        let test = array![[6.0]];
        let mut scaler = StandardScaler::new();
        scaler.fit(&train).unwrap();
        let out = scaler.transform(&test).unwrap();
        // (6 - 2) / std(train), not test's own statistics
        let train_std = (8.0f64 / 3.0).sqrt();
        assert!((out[[0, 0]] - 4.0 / train_std).abs() < 1e-10);
    }

    #[test]
    fn test_constant_column_passes_through() {
        let x = array![[5.0], [5.0], [5.0]];
        let mut scaler = StandardScaler::new();
        let out = scaler.fit_transform(&x).unwrap();
        assert!(out.iter().all(|v| v.abs() < 1e-10));
    }

    #[test]
    fn test_width_mismatch_is_schema_error() {
        let mut scaler = StandardScaler::new();
        scaler.fit(&array![[1.0, 2.0]]).unwrap();
        let err = scaler.transform(&array![[1.0]]).unwrap_err();
        assert!(matches!(err, TabtrainError::Schema(_)));
    }
}
