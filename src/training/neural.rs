//! Neural network training loop

use crate::error::{Result, TabtrainError};
use crate::metrics::{
    accuracy_score, confusion_matrix, mean_absolute_error, mean_squared_error,
    precision_recall_f1, r2_score, MetricsReport,
};
use crate::nn::{Activation, FeedForwardNet, Loss, Optimizer, OptimizerKind, DROPOUT_RATE};
use crate::preprocessing::{PreparedData, TaskType};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

pub const DEFAULT_EPOCHS: usize = 50;
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Requested network shape and training schedule. String fields mirror the
/// wire protocol; unknown names degrade to defaults except for the
/// architecture, which is a hard error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuralConfig {
    pub architecture: String,
    pub hidden_layers: Vec<usize>,
    pub activation: String,
    pub dropout: f64,
    pub optimizer: String,
    pub learning_rate: f64,
    pub loss: String,
    pub epochs: usize,
    pub batch_size: usize,
    pub seed: u64,
}

impl Default for NeuralConfig {
    fn default() -> Self {
        Self {
            architecture: "mlp".to_string(),
            hidden_layers: vec![64, 32],
            activation: "relu".to_string(),
            dropout: DROPOUT_RATE,
            optimizer: "adam".to_string(),
            learning_rate: crate::nn::DEFAULT_LEARNING_RATE,
            loss: String::new(),
            epochs: DEFAULT_EPOCHS,
            batch_size: DEFAULT_BATCH_SIZE,
            seed: 42,
        }
    }
}

/// Per-epoch curves. Accuracy entries are fixed at 0.0 for regression so
/// the history shape is the same for both tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub train_loss: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub train_acc: Vec<f64>,
    pub val_acc: Vec<f64>,
    pub epochs: usize,
}

/// A trained network with enough identity to decode its outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuralModel {
    pub net: FeedForwardNet,
    pub loss: Loss,
    pub task_type: TaskType,
    n_classes: usize,
}

impl NeuralModel {
    /// Class indices for classification, raw values for regression.
    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        let raw = self.net.predict_raw(x);
        if self.task_type.is_classification() {
            Array1::from_iter(raw.rows().into_iter().map(|row| {
                row.iter()
                    .enumerate()
                    .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(i, _)| i as f64)
                    .unwrap_or(0.0)
            }))
        } else {
            raw.column(0).to_owned()
        }
    }

    /// Softmax class probabilities.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.task_type.is_classification() {
            return Err(TabtrainError::Data(
                "probabilities are only defined for classification networks".to_string(),
            ));
        }
        let raw = self.net.predict_raw(x);
        let mut out = raw;
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
        Ok(out)
    }

    pub fn parameter_count(&self) -> usize {
        self.net.parameter_count()
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }
}

/// Result of a neural training run.
#[derive(Debug, Clone)]
pub struct NeuralOutcome {
    pub model: NeuralModel,
    pub report: MetricsReport,
    pub history: TrainingHistory,
}

/// Train a feed-forward network on prepared partitions.
///
/// Only the "mlp" architecture exists; anything else is rejected up front.
/// Validation curves use the carved-out validation slice when the
/// preparation produced one, otherwise the test partition.
pub fn train_neural(prepared: &PreparedData, config: &NeuralConfig) -> Result<NeuralOutcome> {
    if config.architecture != "mlp" {
        return Err(TabtrainError::UnsupportedArchitecture(config.architecture.clone()));
    }
    let started = Instant::now();
    let task = prepared.task_type;

    let n_classes = if task.is_classification() {
        let max = prepared
            .y_train
            .iter()
            .chain(prepared.y_test.iter())
            .chain(prepared.y_val.iter().flatten())
            .fold(0i64, |acc, &v| acc.max(v.round() as i64));
        (max + 1) as usize
    } else {
        0
    };

    let mut loss = Loss::resolve(&config.loss, task.is_classification());
    if loss == Loss::BceWithLogits && n_classes != 2 {
        warn!(n_classes, "binary cross-entropy needs two classes, using cross_entropy");
        loss = Loss::CrossEntropy;
    }

    let output_dim = if task.is_classification() { n_classes.max(2) } else { 1 };
    let net = FeedForwardNet::new(
        prepared.x_train.ncols(),
        &config.hidden_layers,
        output_dim,
        Activation::parse(&config.activation),
        config.dropout,
        config.seed,
    )?;
    let mut model = NeuralModel {
        net,
        loss,
        task_type: task,
        n_classes: output_dim,
    };
    let mut optimizer = Optimizer::new(
        OptimizerKind::parse(&config.optimizer),
        config.learning_rate,
        &model.net,
    );

    let targets_train = to_targets(&prepared.y_train, task, output_dim);
    let (x_val, y_val) = match (&prepared.x_val, &prepared.y_val) {
        (Some(x), Some(y)) => (x, y),
        _ => (&prepared.x_test, &prepared.y_test),
    };
    let targets_val = to_targets(y_val, task, output_dim);

    let n_train = prepared.x_train.nrows();
    let batch_size = config.batch_size.max(1).min(n_train);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);

    let mut history = TrainingHistory::default();
    for epoch in 0..config.epochs.max(1) {
        let mut order: Vec<usize> = (0..n_train).collect();
        order.shuffle(&mut rng);

        let mut epoch_loss = 0.0;
        let mut batches = 0usize;
        for chunk in order.chunks(batch_size) {
            let x_batch = prepared.x_train.select(Axis(0), chunk);
            let t_batch = targets_train.select(Axis(0), chunk);
            let (batch_loss, grads) = model.net.backprop(&x_batch, &t_batch, loss, &mut rng);
            optimizer.apply(&mut model.net, &grads);
            epoch_loss += batch_loss;
            batches += 1;
        }

        history.train_loss.push(epoch_loss / batches.max(1) as f64);
        history
            .val_loss
            .push(loss.value(&model.net.predict_raw(x_val), &targets_val));
        if task.is_classification() {
            history
                .train_acc
                .push(accuracy_score(&prepared.y_train, &model.predict(&prepared.x_train)));
            history.val_acc.push(accuracy_score(y_val, &model.predict(x_val)));
        } else {
            history.train_acc.push(0.0);
            history.val_acc.push(0.0);
        }
        history.epochs = epoch + 1;
    }

    let mut report = evaluate(&model, prepared);
    report.training_time_secs = started.elapsed().as_secs_f64();
    info!(
        epochs = history.epochs,
        parameters = model.parameter_count(),
        "neural training finished"
    );

    Ok(NeuralOutcome { model, report, history })
}

fn to_targets(y: &Array1<f64>, task: TaskType, output_dim: usize) -> Array2<f64> {
    if task.is_classification() {
        let mut out = Array2::zeros((y.len(), output_dim));
        for (i, &v) in y.iter().enumerate() {
            let idx = (v.round() as usize).min(output_dim.saturating_sub(1));
            out[[i, idx]] = 1.0;
        }
        out
    } else {
        y.clone().insert_axis(Axis(1))
    }
}

fn evaluate(model: &NeuralModel, prepared: &PreparedData) -> MetricsReport {
    let mut report = MetricsReport::new();
    let train_preds = model.predict(&prepared.x_train);
    let test_preds = model.predict(&prepared.x_test);

    let targets_test = to_targets(&prepared.y_test, prepared.task_type, model.n_classes);
    report.test_loss = Some(
        model
            .loss
            .value(&model.net.predict_raw(&prepared.x_test), &targets_test),
    );

    if prepared.task_type.is_classification() {
        report.train_accuracy = Some(accuracy_score(&prepared.y_train, &train_preds));
        report.test_accuracy = Some(accuracy_score(&prepared.y_test, &test_preds));
        let (precision, recall, f1) = precision_recall_f1(&prepared.y_test, &test_preds);
        report.precision = Some(precision);
        report.recall = Some(recall);
        report.f1_score = Some(f1);
        report.confusion_matrix = Some(confusion_matrix(&prepared.y_test, &test_preds));
    } else {
        report.train_mse = Some(mean_squared_error(&prepared.y_train, &train_preds));
        report.train_r2 = Some(r2_score(&prepared.y_train, &train_preds));
        report.test_mse = Some(mean_squared_error(&prepared.y_test, &test_preds));
        report.test_mae = Some(mean_absolute_error(&prepared.y_test, &test_preds));
        report.test_rmse = Some(mean_squared_error(&prepared.y_test, &test_preds).sqrt());
        report.test_r2 = Some(r2_score(&prepared.y_test, &test_preds));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::{prepare, SplitSpec};
    use polars::prelude::*;

    fn classification_frame(n: usize) -> DataFrame {
        let x1: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { 0.0 } else { 5.0 } + (i as f64) * 0.01).collect();
        let x2: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { 1.0 } else { -4.0 } - (i as f64) * 0.01).collect();
        let y: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "a" } else { "b" }).collect();
        df! { "x1" => x1, "x2" => x2, "label" => y }.unwrap()
    }

    fn regression_frame(n: usize) -> DataFrame {
        let x: Vec<f64> = (0..n).map(|i| i as f64 / n as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 0.5).collect();
        df! { "x" => x, "target" => y }.unwrap()
    }

    fn quick_config() -> NeuralConfig {
        NeuralConfig {
            hidden_layers: vec![8],
            epochs: 30,
            ..Default::default()
        }
    }

    #[test]
    fn test_unknown_architecture_rejected() {
        let prepared = prepare(
            &regression_frame(30),
            "target",
            SplitSpec::default().with_validation(true),
        )
        .unwrap();
        let config = NeuralConfig {
            architecture: "transformer".to_string(),
            ..quick_config()
        };
        let err = train_neural(&prepared, &config).unwrap_err();
        assert!(matches!(err, TabtrainError::UnsupportedArchitecture(_)));
    }

    #[test]
    fn test_history_lengths_match_epochs() {
        let prepared = prepare(
            &classification_frame(60),
            "label",
            SplitSpec::default().with_validation(true),
        )
        .unwrap();
        let outcome = train_neural(&prepared, &quick_config()).unwrap();
        let h = &outcome.history;
        assert_eq!(h.epochs, 30);
        assert_eq!(h.train_loss.len(), 30);
        assert_eq!(h.val_loss.len(), 30);
        assert_eq!(h.train_acc.len(), 30);
        assert_eq!(h.val_acc.len(), 30);
    }

    #[test]
    fn test_classification_learns_separable_data() {
        let prepared = prepare(
            &classification_frame(80),
            "label",
            SplitSpec::default().with_validation(true),
        )
        .unwrap();
        let mut config = quick_config();
        config.epochs = 80;
        let outcome = train_neural(&prepared, &config).unwrap();
        assert!(outcome.report.test_accuracy.unwrap() > 0.8);
        assert!(outcome.report.confusion_matrix.is_some());
    }

    #[test]
    fn test_regression_history_acc_is_zero() {
        let prepared = prepare(
            &regression_frame(50),
            "target",
            SplitSpec::default().with_validation(true),
        )
        .unwrap();
        let outcome = train_neural(&prepared, &quick_config()).unwrap();
        assert!(outcome.history.train_acc.iter().all(|&v| v == 0.0));
        assert!(outcome.history.val_acc.iter().all(|&v| v == 0.0));
        assert!(outcome.report.test_mse.is_some());
        assert!(outcome.report.test_accuracy.is_none());
    }

    #[test]
    fn test_loss_decreases() {
        let prepared = prepare(
            &regression_frame(60),
            "target",
            SplitSpec::default().with_validation(true),
        )
        .unwrap();
        let mut config = quick_config();
        config.epochs = 60;
        config.dropout = 0.0;
        let outcome = train_neural(&prepared, &config).unwrap();
        let h = &outcome.history;
        assert!(h.train_loss.last().unwrap() < h.train_loss.first().unwrap());
    }

    #[test]
    fn test_report_carries_terminal_test_loss() {
        let class_prepared = prepare(
            &classification_frame(60),
            "label",
            SplitSpec::default().with_validation(true),
        )
        .unwrap();
        let outcome = train_neural(&class_prepared, &quick_config()).unwrap();
        let loss = outcome.report.test_loss.unwrap();
        assert!(loss.is_finite() && loss >= 0.0);

        let reg_prepared = prepare(
            &regression_frame(50),
            "target",
            SplitSpec::default().with_validation(true),
        )
        .unwrap();
        let outcome = train_neural(&reg_prepared, &quick_config()).unwrap();
        let loss = outcome.report.test_loss.unwrap();
        assert!(loss.is_finite() && loss >= 0.0);
    }

    #[test]
    fn test_parameter_count_reported() {
        let prepared = prepare(
            &classification_frame(40),
            "label",
            SplitSpec::default().with_validation(true),
        )
        .unwrap();
        let outcome = train_neural(&prepared, &quick_config()).unwrap();
        // 2 inputs -> 8 hidden -> 2 outputs: 2*8+8 + 8*2+2 = 42
        assert_eq!(outcome.model.parameter_count(), 42);
    }
}
