//! Model persistence: three JSON artifacts per saved model

use super::{SessionModel, TrainedSession};
use crate::error::{Result, TabtrainError};
use crate::preprocessing::{LabelEncoder, OneHotEncoder, StandardScaler, TaskType};
use crate::training::TrainingHistory;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// The model itself.
#[derive(Debug, Serialize, Deserialize)]
struct ModelArtifact {
    model: SessionModel,
}

/// The fitted preprocessing transforms, kept separate so inference-side
/// tooling can load them without the model.
#[derive(Debug, Serialize, Deserialize)]
struct TransformArtifact {
    scaler: StandardScaler,
    encoder: OneHotEncoder,
    label_encoder: Option<LabelEncoder>,
}

/// Human-inspectable description of what was trained.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_kind: String,
    pub task_type: TaskType,
    pub feature_names: Vec<String>,
    pub target_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training_history: Option<TrainingHistory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_count: Option<usize>,
}

fn artifact_paths(dir: &Path, name: &str) -> (PathBuf, PathBuf, PathBuf) {
    (
        dir.join(format!("{}_model.json", name)),
        dir.join(format!("{}_scaler.json", name)),
        dir.join(format!("{}_metadata.json", name)),
    )
}

/// Write the session's model, transforms, and metadata under `dir`.
pub fn save_session(session: &TrainedSession, dir: &Path, name: &str) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let (model_path, scaler_path, meta_path) = artifact_paths(dir, name);

    let model_json = serde_json::to_string_pretty(&ModelArtifact {
        model: session.model.clone(),
    })?;
    fs::write(&model_path, model_json)?;

    let transform_json = serde_json::to_string_pretty(&TransformArtifact {
        scaler: session.scaler.clone(),
        encoder: session.encoder.clone(),
        label_encoder: session.label_encoder.clone(),
    })?;
    fs::write(&scaler_path, transform_json)?;

    let metadata = ModelMetadata {
        model_kind: session.model.kind_name(),
        task_type: session.task_type,
        feature_names: session.feature_names.clone(),
        target_name: session.target_name.clone(),
        training_history: session.history.clone(),
        parameter_count: session.model.parameter_count(),
    };
    fs::write(&meta_path, serde_json::to_string_pretty(&metadata)?)?;

    info!(name, dir = %dir.display(), "saved model artifacts");
    Ok(vec![model_path, scaler_path, meta_path])
}

/// Load a previously saved classical model back into a session.
///
/// Neural artifacts are rejected: a reloaded network would predict, but
/// its session would lack the training history semantics the save path
/// promises, so the classical-only contract is explicit.
pub fn load_session(dir: &Path, name: &str) -> Result<TrainedSession> {
    let (model_path, scaler_path, meta_path) = artifact_paths(dir, name);

    let model: ModelArtifact = serde_json::from_str(&fs::read_to_string(&model_path)?)?;
    if matches!(model.model, SessionModel::Neural(_)) {
        return Err(TabtrainError::Data(
            "loading neural models is not supported, retrain instead".to_string(),
        ));
    }
    let transforms: TransformArtifact = serde_json::from_str(&fs::read_to_string(&scaler_path)?)?;
    let metadata: ModelMetadata = serde_json::from_str(&fs::read_to_string(&meta_path)?)?;

    Ok(TrainedSession {
        model: model.model,
        scaler: transforms.scaler,
        encoder: transforms.encoder,
        label_encoder: transforms.label_encoder,
        feature_names: metadata.feature_names,
        target_name: metadata.target_name,
        task_type: metadata.task_type,
        x_test: None,
        y_test: None,
        history: metadata.training_history,
    })
}
