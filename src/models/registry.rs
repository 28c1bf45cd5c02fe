//! Model registry: kind parsing, construction, and unified dispatch

use super::boosting::GradientBoosting;
use super::forest::RandomForest;
use super::knn::KNearestNeighbors;
use super::linear::{LinearRegression, LogisticRegression};
use super::svm::{Kernel, SupportVectorMachine};
use super::WeightScheme;
use crate::error::{Result, TabtrainError};
use crate::preprocessing::TaskType;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// The closed set of classical model families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Logistic regression for classification, least squares for
    /// regression.
    Linear,
    RandomForest,
    GradientBoosting,
    Svm,
    Knn,
}

impl ModelKind {
    /// Parse a requested model name. Short aliases match the wire names the
    /// engine accepts.
    pub fn parse(name: &str, task: TaskType) -> Result<Self> {
        match name {
            "linear" | "logistic" | "linear_regression" | "logistic_regression" => Ok(ModelKind::Linear),
            "rf" | "random_forest" => Ok(ModelKind::RandomForest),
            "gb" | "gradient_boosting" => Ok(ModelKind::GradientBoosting),
            "svm" => Ok(ModelKind::Svm),
            "knn" => Ok(ModelKind::Knn),
            other => Err(TabtrainError::UnsupportedModel {
                kind: other.to_string(),
                task: task.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Linear => "linear",
            ModelKind::RandomForest => "random_forest",
            ModelKind::GradientBoosting => "gradient_boosting",
            ModelKind::Svm => "svm",
            ModelKind::Knn => "knn",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hyperparameters a caller (or the search module) may pin. Unset fields
/// fall back to each family's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub n_estimators: Option<usize>,
    /// None means unbounded depth for forests.
    pub max_depth: Option<usize>,
    pub min_samples_split: Option<usize>,
    pub learning_rate: Option<f64>,
    pub c: Option<f64>,
    pub kernel: Option<Kernel>,
    pub k: Option<usize>,
    pub weights: Option<WeightScheme>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum ModelInner {
    LeastSquares(LinearRegression),
    Logistic(LogisticRegression),
    Forest(RandomForest),
    Boosting(GradientBoosting),
    Svm(SupportVectorMachine),
    Knn(KNearestNeighbors),
}

/// A constructed classical model with its identity attached.
///
/// Dispatch is a match over the closed variant set; capability queries
/// (`supports_proba`, `feature_importances`) replace any "try it and see"
/// probing at the call sites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassicalModel {
    kind: ModelKind,
    task: TaskType,
    inner: ModelInner,
}

impl ClassicalModel {
    /// Build an unfitted model for the given family, task, and parameters.
    pub fn build(kind: ModelKind, task: TaskType, params: &ModelParams) -> Self {
        let classify = task.is_classification();
        let inner = match kind {
            ModelKind::Linear => {
                if classify {
                    ModelInner::Logistic(LogisticRegression::new())
                } else {
                    ModelInner::LeastSquares(LinearRegression::new())
                }
            }
            ModelKind::RandomForest => {
                let mut rf = if classify {
                    RandomForest::classifier()
                } else {
                    RandomForest::regressor()
                };
                if let Some(n) = params.n_estimators {
                    rf = rf.with_n_estimators(n);
                }
                rf = rf.with_max_depth(params.max_depth);
                if let Some(m) = params.min_samples_split {
                    rf = rf.with_min_samples_split(m);
                }
                ModelInner::Forest(rf)
            }
            ModelKind::GradientBoosting => {
                let mut gb = if classify {
                    GradientBoosting::classifier()
                } else {
                    GradientBoosting::regressor()
                };
                if let Some(n) = params.n_estimators {
                    gb = gb.with_n_estimators(n);
                }
                if let Some(lr) = params.learning_rate {
                    gb = gb.with_learning_rate(lr);
                }
                if let Some(d) = params.max_depth {
                    gb = gb.with_max_depth(d);
                }
                ModelInner::Boosting(gb)
            }
            ModelKind::Svm => {
                let mut svm = if classify {
                    SupportVectorMachine::classifier()
                } else {
                    SupportVectorMachine::regressor()
                };
                if let Some(c) = params.c {
                    svm = svm.with_c(c);
                }
                if let Some(kernel) = params.kernel {
                    svm = svm.with_kernel(kernel);
                }
                ModelInner::Svm(svm)
            }
            ModelKind::Knn => {
                let mut knn = if classify {
                    KNearestNeighbors::classifier()
                } else {
                    KNearestNeighbors::regressor()
                };
                if let Some(k) = params.k {
                    knn = knn.with_k(k);
                }
                if let Some(w) = params.weights {
                    knn = knn.with_weights(w);
                }
                ModelInner::Knn(knn)
            }
        };
        Self { kind, task, inner }
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn task(&self) -> TaskType {
        self.task
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        match &mut self.inner {
            ModelInner::LeastSquares(m) => m.fit(x, y).map(|_| ()),
            ModelInner::Logistic(m) => m.fit(x, y).map(|_| ()),
            ModelInner::Forest(m) => m.fit(x, y).map(|_| ()),
            ModelInner::Boosting(m) => m.fit(x, y).map(|_| ()),
            ModelInner::Svm(m) => m.fit(x, y).map(|_| ()),
            ModelInner::Knn(m) => m.fit(x, y).map(|_| ()),
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match &self.inner {
            ModelInner::LeastSquares(m) => m.predict(x),
            ModelInner::Logistic(m) => m.predict(x),
            ModelInner::Forest(m) => m.predict(x),
            ModelInner::Boosting(m) => m.predict(x),
            ModelInner::Svm(m) => m.predict(x),
            ModelInner::Knn(m) => m.predict(x),
        }
    }

    /// Whether this model can produce class probabilities.
    pub fn supports_proba(&self) -> bool {
        self.task.is_classification() && !matches!(self.inner, ModelInner::LeastSquares(_))
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match &self.inner {
            ModelInner::Logistic(m) => m.predict_proba(x),
            ModelInner::Forest(m) => m.predict_proba(x),
            ModelInner::Boosting(m) => m.predict_proba(x),
            ModelInner::Svm(m) => m.predict_proba(x),
            ModelInner::Knn(m) => m.predict_proba(x),
            ModelInner::LeastSquares(_) => Err(TabtrainError::Data(
                "least-squares regression has no probability estimates".to_string(),
            )),
        }
    }

    /// Impurity-based importances where the family defines them, None for
    /// the distance- and margin-based families.
    pub fn feature_importances(&self) -> Option<Array1<f64>> {
        match &self.inner {
            ModelInner::Forest(m) => m.feature_importances().cloned(),
            ModelInner::Boosting(m) => m.feature_importances().cloned(),
            _ => None,
        }
    }
}
