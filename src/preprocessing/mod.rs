//! Feature preparation for model training
//!
//! Covers the full path from a raw tabular frame to fixed numeric
//! partitions: task-type inference, drop-first one-hot encoding, target
//! label encoding, seeded splitting, and train-fitted standardization.

mod encoder;
mod scaler;
mod pipeline;

pub use encoder::{LabelEncoder, OneHotEncoder};
pub use scaler::StandardScaler;
pub use pipeline::{prepare, PreparedData, SplitSpec};

use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Targets with fewer distinct values than this are treated as
/// classification even when stored numerically. Kept at the original
/// system's value for compatibility.
pub const CLASS_CARDINALITY_THRESHOLD: usize = 20;

/// Default seed for partition shuffles.
pub const DEFAULT_SEED: u64 = 42;

/// Default held-out test fraction.
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;

/// Fixed validation fraction carved out of the training partition on the
/// neural path.
pub const VALIDATION_FRACTION: f64 = 0.2;

/// Type of prediction task, inferred per target column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Classification,
    Regression,
}

impl TaskType {
    pub fn is_classification(self) -> bool {
        matches!(self, TaskType::Classification)
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::Classification => write!(f, "classification"),
            TaskType::Regression => write!(f, "regression"),
        }
    }
}

/// Infer the task type from a target column.
///
/// Classification when the stored representation is non-numeric, or when
/// the number of distinct values falls below
/// [`CLASS_CARDINALITY_THRESHOLD`]; regression otherwise.
pub fn infer_task_type(target: &Series) -> TaskType {
    if !target.dtype().is_primitive_numeric() {
        return TaskType::Classification;
    }
    let distinct = target.n_unique().unwrap_or(usize::MAX);
    if distinct < CLASS_CARDINALITY_THRESHOLD {
        TaskType::Classification
    } else {
        TaskType::Regression
    }
}
