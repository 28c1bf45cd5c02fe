//! tabtrain - Model training and evaluation engine for tabular data
//!
//! The crate takes a tabular dataset from raw records to a trained,
//! evaluated model behind an opaque session handle:
//!
//! - [`data`] - Record-oriented dataset loading into DataFrames
//! - [`preprocessing`] - Task inference, encoding, splitting, scaling
//! - [`models`] - Classical model families and the registry
//! - [`training`] - Cross-validation, hyperparameter search, trainers
//! - [`nn`] - The feed-forward network, losses, and optimizers
//! - [`metrics`] - Evaluation metrics and the per-training report
//! - [`engine`] - Session-scoped orchestration and persistence

pub mod data;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod models;
pub mod nn;
pub mod preprocessing;
pub mod training;

pub use error::{Result, TabtrainError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::data::records_to_frame;
    pub use crate::engine::{
        Prediction, SamplePrediction, SessionId, TrainEngine, TrainOutcome, TrainedSession,
    };
    pub use crate::error::{Result, TabtrainError};
    pub use crate::metrics::{FeatureImportance, MetricsReport, RocCurve};
    pub use crate::models::{ClassicalModel, Kernel, ModelKind, ModelParams, WeightScheme};
    pub use crate::nn::{Activation, Loss, OptimizerKind};
    pub use crate::preprocessing::{
        infer_task_type, prepare, PreparedData, SplitSpec, TaskType,
    };
    pub use crate::training::{
        train_classical, train_neural, ClassicalTrainOptions, NeuralConfig, SearchStrategy,
        TrainingHistory,
    };
}
