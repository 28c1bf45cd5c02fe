//! Categorical encoding for features and targets

use crate::error::{Result, TabtrainError};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Per-column encoding plan captured at fit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum ColumnPlan {
    /// Passed through as a single f64 column, nulls imputed to 0.0.
    Numeric { name: String },
    /// Expanded to one indicator column per category except the first
    /// (drop-first keeps the design matrix full rank). Unseen categories
    /// encode as all zeros, same as the dropped baseline.
    Categorical { name: String, categories: Vec<String> },
}

/// Drop-first one-hot encoder over a full feature frame.
///
/// Fitting scans every column once: numeric columns pass through, text
/// columns get their sorted distinct values recorded. Transform produces a
/// dense matrix with numeric columns first (in frame order) followed by the
/// indicator columns, matching the fitted feature-name list exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneHotEncoder {
    plans: Vec<ColumnPlan>,
    feature_names: Vec<String>,
    is_fitted: bool,
}

impl OneHotEncoder {
    pub fn new() -> Self {
        Self {
            plans: Vec::new(),
            feature_names: Vec::new(),
            is_fitted: false,
        }
    }

    /// Record the encoding plan from a feature frame.
    pub fn fit(&mut self, df: &DataFrame) -> Result<&mut Self> {
        let mut numeric = Vec::new();
        let mut categorical = Vec::new();
        for col in df.get_columns() {
            let name = col.name().to_string();
            if col.dtype().is_primitive_numeric() {
                numeric.push(ColumnPlan::Numeric { name });
            } else {
                let series = col.as_materialized_series().cast(&DataType::String)?;
                let mut distinct = BTreeSet::new();
                for v in series.str()?.into_iter().flatten() {
                    distinct.insert(v.to_string());
                }
                categorical.push(ColumnPlan::Categorical {
                    name,
                    categories: distinct.into_iter().collect(),
                });
            }
        }
        // Numeric columns first, indicators appended after, mirroring the
        // dummy-expansion layout the rest of the pipeline expects.
        self.plans = numeric;
        self.plans.extend(categorical);
        self.feature_names = self
            .plans
            .iter()
            .flat_map(|p| match p {
                ColumnPlan::Numeric { name } => vec![name.clone()],
                ColumnPlan::Categorical { name, categories } => categories
                    .iter()
                    .skip(1)
                    .map(|c| format!("{}_{}", name, c))
                    .collect(),
            })
            .collect();
        self.is_fitted = true;
        Ok(self)
    }

    /// Encode a frame against the fitted plan.
    pub fn transform(&self, df: &DataFrame) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(TabtrainError::NotTrained);
        }
        let n_rows = df.height();
        let mut out = Array2::zeros((n_rows, self.feature_names.len()));
        let mut offset = 0usize;
        for plan in &self.plans {
            match plan {
                ColumnPlan::Numeric { name } => {
                    let col = df
                        .column(name)
                        .map_err(|_| TabtrainError::Schema(format!("missing feature column '{}'", name)))?;
                    let vals = col.as_materialized_series().cast(&DataType::Float64)?;
                    for (i, v) in vals.f64()?.into_iter().enumerate() {
                        out[[i, offset]] = v.unwrap_or(0.0);
                    }
                    offset += 1;
                }
                ColumnPlan::Categorical { name, categories } => {
                    let width = categories.len().saturating_sub(1);
                    let col = df
                        .column(name)
                        .map_err(|_| TabtrainError::Schema(format!("missing feature column '{}'", name)))?;
                    let series = col.as_materialized_series().cast(&DataType::String)?;
                    for (i, v) in series.str()?.into_iter().enumerate() {
                        if let Some(v) = v {
                            // Position 0 is the dropped baseline.
                            if let Some(pos) = categories.iter().position(|c| c == v) {
                                if pos > 0 {
                                    out[[i, offset + pos - 1]] = 1.0;
                                }
                            }
                        }
                    }
                    offset += width;
                }
            }
        }
        Ok(out)
    }

    pub fn fit_transform(&mut self, df: &DataFrame) -> Result<Array2<f64>> {
        self.fit(df)?;
        self.transform(df)
    }

    /// Post-encoding feature names, in matrix column order.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }
}

impl Default for OneHotEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Target label encoder for classification on text targets.
///
/// Classes are stored sorted, so the class index assignment is stable
/// across fits on reordered data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
    is_fitted: bool,
}

impl LabelEncoder {
    pub fn new() -> Self {
        Self {
            classes: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn fit(&mut self, target: &Series) -> Result<&mut Self> {
        let series = target.cast(&DataType::String)?;
        let mut distinct = BTreeSet::new();
        for v in series.str()?.into_iter().flatten() {
            distinct.insert(v.to_string());
        }
        self.classes = distinct.into_iter().collect();
        self.is_fitted = true;
        Ok(self)
    }

    /// Map labels to class indices as f64.
    pub fn transform(&self, target: &Series) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(TabtrainError::NotTrained);
        }
        let series = target.cast(&DataType::String)?;
        let mut out = Vec::with_capacity(target.len());
        for v in series.str()?.into_iter() {
            match v {
                Some(v) => match self.classes.iter().position(|c| c == v) {
                    Some(idx) => out.push(idx as f64),
                    None => {
                        return Err(TabtrainError::Data(format!("unknown target label '{}'", v)))
                    }
                },
                None => return Err(TabtrainError::Data("null target label".to_string())),
            }
        }
        Ok(Array1::from_vec(out))
    }

    pub fn fit_transform(&mut self, target: &Series) -> Result<Array1<f64>> {
        self.fit(target)?;
        self.transform(target)
    }

    /// Map class indices back to the original labels. Values are rounded to
    /// the nearest class index before lookup.
    pub fn inverse_transform(&self, values: &Array1<f64>) -> Result<Vec<String>> {
        if !self.is_fitted {
            return Err(TabtrainError::NotTrained);
        }
        values
            .iter()
            .map(|&v| {
                let idx = v.round() as usize;
                self.classes
                    .get(idx)
                    .cloned()
                    .ok_or_else(|| TabtrainError::Data(format!("class index {} out of range", idx)))
            })
            .collect()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

impl Default for LabelEncoder {
    fn default() -> Self {
        Self::new()
    }
}
