//! Error types for the tabtrain engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, TabtrainError>;

/// Main error type for the engine.
///
/// Schema and "unsupported" variants are fatal and surface immediately with
/// the offending value named. Secondary diagnostics (cross-validation,
/// ROC/AUC) are recovered locally and never reach the caller through this
/// type.
#[derive(Error, Debug)]
pub enum TabtrainError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Unsupported model kind: {kind} for {task} task")]
    UnsupportedModel { kind: String, task: String },

    #[error("Unsupported architecture: {0} (only \"mlp\" is implemented)")]
    UnsupportedArchitecture(String),

    #[error("No trained model available")]
    NotTrained,

    #[error("Numeric fit error: {0}")]
    NumericFit(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<polars::error::PolarsError> for TabtrainError {
    fn from(err: polars::error::PolarsError) -> Self {
        TabtrainError::Data(err.to_string())
    }
}

impl From<serde_json::Error> for TabtrainError {
    fn from(err: serde_json::Error) -> Self {
        TabtrainError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for TabtrainError {
    fn from(err: ndarray::ShapeError) -> Self {
        TabtrainError::Data(err.to_string())
    }
}
