//! The training engine: session-scoped training, prediction, sampling,
//! and persistence

mod store;

pub use store::ModelMetadata;

use crate::error::{Result, TabtrainError};
use crate::metrics::MetricsReport;
use crate::models::{ClassicalModel, ModelKind, ModelParams};
use crate::preprocessing::{
    infer_task_type, prepare, LabelEncoder, OneHotEncoder, SplitSpec, StandardScaler, TaskType,
};
use crate::training::{
    train_classical, train_neural, ClassicalTrainOptions, NeuralConfig, NeuralModel,
    TrainingHistory,
};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Opaque handle to one trained model and its preprocessing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for SessionId {
    type Err = TabtrainError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(SessionId)
            .map_err(|e| TabtrainError::Data(format!("invalid session id: {}", e)))
    }
}

/// Either branch of the model zoo, tagged for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum SessionModel {
    Classical(ClassicalModel),
    Neural(NeuralModel),
}

impl SessionModel {
    pub fn kind_name(&self) -> String {
        match self {
            SessionModel::Classical(m) => m.kind().to_string(),
            SessionModel::Neural(_) => "mlp".to_string(),
        }
    }

    pub fn parameter_count(&self) -> Option<usize> {
        match self {
            SessionModel::Classical(_) => None,
            SessionModel::Neural(m) => Some(m.parameter_count()),
        }
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            SessionModel::Classical(m) => m.predict(x),
            SessionModel::Neural(m) => Ok(m.predict(x)),
        }
    }

    fn supports_proba(&self) -> bool {
        match self {
            SessionModel::Classical(m) => m.supports_proba(),
            SessionModel::Neural(m) => m.task_type.is_classification(),
        }
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match self {
            SessionModel::Classical(m) => m.predict_proba(x),
            SessionModel::Neural(m) => m.predict_proba(x),
        }
    }
}

/// Everything a trained session keeps for later prediction and sampling.
/// Held-out partitions are absent on sessions restored from disk.
#[derive(Debug, Clone)]
pub struct TrainedSession {
    pub model: SessionModel,
    pub scaler: StandardScaler,
    pub encoder: OneHotEncoder,
    pub label_encoder: Option<LabelEncoder>,
    pub feature_names: Vec<String>,
    pub target_name: String,
    pub task_type: TaskType,
    pub x_test: Option<Array2<f64>>,
    pub y_test: Option<Array1<f64>>,
    pub history: Option<TrainingHistory>,
}

/// What a training call hands back to the transport layer.
#[derive(Debug, Clone, Serialize)]
pub struct TrainOutcome {
    pub session_id: SessionId,
    pub model_kind: String,
    pub task_type: TaskType,
    pub metrics: MetricsReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training_history: Option<TrainingHistory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_count: Option<usize>,
}

/// Predictions on new rows, with labels decoded when the target was text.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub values: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

/// One held-out row shown back with its prediction.
#[derive(Debug, Clone, Serialize)]
pub struct SamplePrediction {
    pub sample_id: usize,
    pub predicted_value: f64,
    /// Serialized as `true_value`, the key downstream consumers read.
    #[serde(rename = "true_value")]
    pub actual_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_percentage: Option<f64>,
}

/// Owns every trained session, keyed by [`SessionId`].
///
/// Training never replaces earlier sessions; callers juggle as many
/// concurrently trained models as they want to pay memory for.
#[derive(Debug, Default)]
pub struct TrainEngine {
    sessions: HashMap<SessionId, TrainedSession>,
}

impl TrainEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The inferred task for a target column of this frame, without
    /// training anything.
    pub fn infer_task(&self, df: &DataFrame, target: &str) -> Result<TaskType> {
        let col = df
            .column(target)
            .map_err(|_| TabtrainError::Schema(format!("target column '{}' not found", target)))?;
        Ok(infer_task_type(col.as_materialized_series()))
    }

    /// Train a classical model and register the session.
    pub fn train_classical(
        &mut self,
        df: &DataFrame,
        target: &str,
        model_name: &str,
        params: ModelParams,
        options: ClassicalTrainOptions,
    ) -> Result<TrainOutcome> {
        let prepared = prepare(df, target, SplitSpec::default().with_seed(options.seed))?;
        let kind = ModelKind::parse(model_name, prepared.task_type)?;
        info!(model = %kind, task = %prepared.task_type, rows = df.height(), "training classical model");

        let outcome = train_classical(&prepared, kind, params, &options)?;
        let session_id = SessionId::new();
        let task_type = prepared.task_type;
        self.sessions.insert(
            session_id,
            TrainedSession {
                model: SessionModel::Classical(outcome.model),
                scaler: prepared.scaler,
                encoder: prepared.encoder,
                label_encoder: prepared.label_encoder,
                feature_names: prepared.feature_names,
                target_name: prepared.target_name,
                task_type,
                x_test: Some(prepared.x_test),
                y_test: Some(prepared.y_test),
                history: None,
            },
        );

        Ok(TrainOutcome {
            session_id,
            model_kind: kind.to_string(),
            task_type,
            metrics: outcome.report,
            training_history: None,
            parameter_count: None,
        })
    }

    /// Train a neural model and register the session.
    pub fn train_neural(
        &mut self,
        df: &DataFrame,
        target: &str,
        config: NeuralConfig,
    ) -> Result<TrainOutcome> {
        let prepared = prepare(
            df,
            target,
            SplitSpec::default().with_seed(config.seed).with_validation(true),
        )?;
        info!(
            architecture = %config.architecture,
            task = %prepared.task_type,
            rows = df.height(),
            "training neural model"
        );

        let outcome = train_neural(&prepared, &config)?;
        let session_id = SessionId::new();
        let task_type = prepared.task_type;
        let parameter_count = outcome.model.parameter_count();
        self.sessions.insert(
            session_id,
            TrainedSession {
                model: SessionModel::Neural(outcome.model),
                scaler: prepared.scaler,
                encoder: prepared.encoder,
                label_encoder: prepared.label_encoder,
                feature_names: prepared.feature_names,
                target_name: prepared.target_name,
                task_type,
                x_test: Some(prepared.x_test),
                y_test: Some(prepared.y_test),
                history: Some(outcome.history.clone()),
            },
        );

        Ok(TrainOutcome {
            session_id,
            model_kind: "mlp".to_string(),
            task_type,
            metrics: outcome.report,
            training_history: Some(outcome.history),
            parameter_count: Some(parameter_count),
        })
    }

    fn session(&self, id: SessionId) -> Result<&TrainedSession> {
        self.sessions.get(&id).ok_or(TabtrainError::NotTrained)
    }

    pub fn has_session(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn drop_session(&mut self, id: SessionId) -> bool {
        self.sessions.remove(&id).is_some()
    }

    /// Predict on new feature rows, applying the session's fitted
    /// encoding and scaling. The frame may carry the target column; it is
    /// ignored if present.
    pub fn predict(&self, id: SessionId, df: &DataFrame) -> Result<Prediction> {
        let session = self.session(id)?;
        let features = if df.get_column_names().iter().any(|c| c.as_str() == session.target_name) {
            df.drop(&session.target_name)?
        } else {
            df.clone()
        };
        let encoded = session.encoder.transform(&features)?;
        let scaled = session.scaler.transform(&encoded)?;
        let values = session.model.predict(&scaled)?;

        let labels = match &session.label_encoder {
            Some(enc) => Some(enc.inverse_transform(&values)?),
            None => None,
        };
        Ok(Prediction {
            values: values.to_vec(),
            labels,
        })
    }

    /// Show up to `n` held-out rows with their predictions.
    ///
    /// This is a presentation aid: an unknown session, a restored session
    /// without held-out data, or a prediction failure all produce an empty
    /// list rather than an error.
    pub fn sample_predictions(&self, id: SessionId, n: usize) -> Vec<SamplePrediction> {
        let Some(session) = self.sessions.get(&id) else {
            warn!(session = %id, "sampling requested for unknown session");
            return Vec::new();
        };
        let (Some(x_test), Some(y_test)) = (&session.x_test, &session.y_test) else {
            warn!(session = %id, "session has no held-out rows to sample");
            return Vec::new();
        };

        let count = n.min(x_test.nrows());
        if count == 0 {
            return Vec::new();
        }
        let x_sample = x_test.slice_axis(Axis(0), ndarray::Slice::from(0..count)).to_owned();

        let preds = match session.model.predict(&x_sample) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "sample prediction failed");
                return Vec::new();
            }
        };
        let proba = if session.model.supports_proba() {
            session.model.predict_proba(&x_sample).ok()
        } else {
            None
        };

        (0..count)
            .map(|i| {
                let predicted = preds[i];
                let actual = y_test[i];
                if session.task_type.is_classification() {
                    let decode = |v: f64| {
                        session
                            .label_encoder
                            .as_ref()
                            .and_then(|enc| enc.inverse_transform(&Array1::from_vec(vec![v])).ok())
                            .and_then(|mut labels| labels.pop())
                    };
                    let row_proba = proba.as_ref().map(|p| p.row(i).to_vec());
                    let confidence = row_proba
                        .as_ref()
                        .map(|row| row.iter().cloned().fold(0.0f64, f64::max));
                    SamplePrediction {
                        sample_id: i + 1,
                        predicted_value: predicted,
                        actual_value: actual,
                        predicted_label: decode(predicted),
                        actual_label: decode(actual),
                        correct: Some(predicted.round() as i64 == actual.round() as i64),
                        confidence,
                        probabilities: row_proba,
                        error: None,
                        error_percentage: None,
                    }
                } else {
                    let error = (predicted - actual).abs();
                    let error_percentage = if actual == 0.0 {
                        0.0
                    } else {
                        error / actual.abs() * 100.0
                    };
                    SamplePrediction {
                        sample_id: i + 1,
                        predicted_value: predicted,
                        actual_value: actual,
                        predicted_label: None,
                        actual_label: None,
                        correct: None,
                        confidence: None,
                        probabilities: None,
                        error: Some(error),
                        error_percentage: Some(error_percentage),
                    }
                }
            })
            .collect()
    }

    /// Persist a session's model, transforms, and metadata as JSON files.
    pub fn save_model(&self, id: SessionId, dir: &Path, name: &str) -> Result<Vec<PathBuf>> {
        let session = self.session(id)?;
        store::save_session(session, dir, name)
    }

    /// Restore a saved classical model into a fresh session.
    pub fn load_model(&mut self, dir: &Path, name: &str) -> Result<SessionId> {
        let session = store::load_session(dir, name)?;
        let session_id = SessionId::new();
        info!(name, session = %session_id, "restored model from disk");
        self.sessions.insert(session_id, session);
        Ok(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
