//! Classical model training with guarded cross-validation

use super::cross_validation::cross_val_score;
use super::search::{search, SearchStrategy};
use crate::error::Result;
use crate::metrics::{
    self, accuracy_score, confusion_matrix, mean_absolute_error, mean_squared_error,
    precision_recall_f1, r2_score, MetricsReport,
};
use crate::models::{ClassicalModel, ModelKind, ModelParams};
use crate::preprocessing::PreparedData;
use std::time::Instant;
use tracing::{info, warn};

/// Default folds for the post-fit cross-validation diagnostic.
pub const DEFAULT_CV_FOLDS: usize = 5;

/// Smallest per-class count that still allows any cross-validation.
pub const MIN_CLASS_COUNT_FOR_CV: usize = 2;

/// Knobs for a classical training run.
#[derive(Debug, Clone, Copy)]
pub struct ClassicalTrainOptions {
    pub cv_folds: usize,
    pub seed: u64,
    /// When set, hyperparameters are searched before the final fit.
    pub search: Option<SearchStrategy>,
}

impl Default for ClassicalTrainOptions {
    fn default() -> Self {
        Self {
            cv_folds: DEFAULT_CV_FOLDS,
            seed: 42,
            search: None,
        }
    }
}

/// A fitted model with its evaluation report.
#[derive(Debug, Clone)]
pub struct ClassicalOutcome {
    pub model: ClassicalModel,
    pub report: MetricsReport,
    pub params: ModelParams,
}

/// Fit one classical model and evaluate it on the held-out partition.
///
/// Cross-validation is a diagnostic, never a failure: degenerate label
/// distributions or fold errors log a warning and leave the scores empty.
pub fn train_classical(
    prepared: &PreparedData,
    kind: ModelKind,
    params: ModelParams,
    options: &ClassicalTrainOptions,
) -> Result<ClassicalOutcome> {
    let started = Instant::now();
    let task = prepared.task_type;

    let params = match options.search {
        Some(strategy) => {
            let outcome = search(kind, task, &prepared.x_train, &prepared.y_train, strategy, options.seed)?;
            info!(
                model = %kind,
                score = outcome.best_score,
                candidates = outcome.n_candidates,
                "hyperparameter search finished"
            );
            outcome.best_params
        }
        None => params,
    };

    let mut model = ClassicalModel::build(kind, task, &params);
    model.fit(&prepared.x_train, &prepared.y_train)?;

    let train_preds = model.predict(&prepared.x_train)?;
    let test_preds = model.predict(&prepared.x_test)?;

    let mut report = MetricsReport::new();
    if task.is_classification() {
        report.train_accuracy = Some(accuracy_score(&prepared.y_train, &train_preds));
        report.test_accuracy = Some(accuracy_score(&prepared.y_test, &test_preds));
        let (precision, recall, f1) = precision_recall_f1(&prepared.y_test, &test_preds);
        report.precision = Some(precision);
        report.recall = Some(recall);
        report.f1_score = Some(f1);
        report.confusion_matrix = Some(confusion_matrix(&prepared.y_test, &test_preds));
        attach_roc(&mut report, &model, prepared);
    } else {
        report.train_mse = Some(mean_squared_error(&prepared.y_train, &train_preds));
        report.train_r2 = Some(r2_score(&prepared.y_train, &train_preds));
        report.test_mse = Some(mean_squared_error(&prepared.y_test, &test_preds));
        report.test_mae = Some(mean_absolute_error(&prepared.y_test, &test_preds));
        report.test_rmse = Some(mean_squared_error(&prepared.y_test, &test_preds).sqrt());
        report.test_r2 = Some(r2_score(&prepared.y_test, &test_preds));
    }

    report.set_cv_scores(guarded_cv(kind, prepared, &params, options));

    if let Some(importances) = model.feature_importances() {
        report.set_feature_importance(&prepared.feature_names, &importances);
    }

    report.training_time_secs = started.elapsed().as_secs_f64();
    Ok(ClassicalOutcome { model, report, params })
}

/// ROC and AUC for binary problems with probability support. Any failure
/// here is reported and the fields stay unset.
fn attach_roc(report: &mut MetricsReport, model: &ClassicalModel, prepared: &PreparedData) {
    if !model.supports_proba() {
        return;
    }
    let mut classes: Vec<i64> = prepared
        .y_train
        .iter()
        .chain(prepared.y_test.iter())
        .map(|&v| v.round() as i64)
        .collect();
    classes.sort_unstable();
    classes.dedup();
    if classes.len() != 2 {
        return;
    }

    let proba = match model.predict_proba(&prepared.x_test) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "probability prediction failed, omitting ROC");
            return;
        }
    };
    let Some(scores) = metrics::positive_class_scores(&proba) else {
        return;
    };
    // Rates are computed against the larger class index as positive.
    let positive = classes[1];
    let y_binary = prepared
        .y_test
        .mapv(|v| if v.round() as i64 == positive { 1.0 } else { 0.0 });
    match metrics::roc_curve(&y_binary, &scores) {
        Some(curve) => {
            report.auc_score = Some(metrics::auc(&curve));
            report.roc_curve = Some(curve);
        }
        None => {
            warn!("test partition holds a single class, omitting ROC");
        }
    }
}

/// Run the CV diagnostic over the training partition, with the safeguards
/// that keep it from failing a training run:
/// - classification with a training class rarer than 2 samples skips CV
/// - a rare training class caps the fold count at its size
/// - regression with fewer training rows than folds skips CV
/// - any fold error degrades to empty scores
///
/// Held-out rows never enter the folds; the test partition stays unseen.
fn guarded_cv(
    kind: ModelKind,
    prepared: &PreparedData,
    params: &ModelParams,
    options: &ClassicalTrainOptions,
) -> Vec<f64> {
    let folds = options.cv_folds;
    let y_train = &prepared.y_train;
    let effective = if prepared.task_type.is_classification() {
        let mut counts = std::collections::HashMap::new();
        for &v in y_train.iter() {
            *counts.entry(v.round() as i64).or_insert(0usize) += 1;
        }
        let min_count = counts.values().copied().min().unwrap_or(0);
        if min_count >= folds {
            folds
        } else if min_count >= MIN_CLASS_COUNT_FOR_CV {
            warn!(min_count, folds, "rare training class caps cross-validation folds");
            min_count.min(folds)
        } else {
            warn!(min_count, "training class too rare for cross-validation, skipping");
            return Vec::new();
        }
    } else {
        if y_train.len() < folds {
            warn!(rows = y_train.len(), folds, "too few training rows for cross-validation, skipping");
            return Vec::new();
        }
        folds
    };

    match cross_val_score(kind, prepared.task_type, params, &prepared.x_train, y_train, effective, options.seed) {
        Ok(scores) => scores,
        Err(e) => {
            warn!(error = %e, "cross-validation failed, leaving scores empty");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::{
        prepare, OneHotEncoder, PreparedData, SplitSpec, StandardScaler, TaskType,
    };
    use ndarray::{Array1, Array2};
    use polars::prelude::*;

    /// Partitions with hand-picked labels, so per-class training counts are
    /// exact rather than whatever the seeded split produced.
    fn prepared_with_labels(train_labels: &[f64], test_labels: &[f64]) -> PreparedData {
        let x_train = Array2::from_shape_fn((train_labels.len(), 1), |(i, _)| i as f64);
        let x_test = Array2::from_shape_fn((test_labels.len(), 1), |(i, _)| 100.0 + i as f64);
        PreparedData {
            x_train,
            x_test,
            y_train: Array1::from_vec(train_labels.to_vec()),
            y_test: Array1::from_vec(test_labels.to_vec()),
            x_val: None,
            y_val: None,
            feature_names: vec!["x".to_string()],
            target_name: "label".to_string(),
            task_type: TaskType::Classification,
            encoder: OneHotEncoder::new(),
            scaler: StandardScaler::new(),
            label_encoder: None,
        }
    }

    fn classification_frame(n: usize) -> DataFrame {
        let x: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { i as f64 * 0.1 } else { 50.0 + i as f64 * 0.1 }).collect();
        let y: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "low" } else { "high" }).collect();
        df! { "x" => x, "label" => y }.unwrap()
    }

    fn regression_frame(n: usize) -> DataFrame {
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let y: Vec<f64> = (0..n).map(|i| 3.0 * i as f64 + 1.0).collect();
        df! { "x" => x, "target" => y }.unwrap()
    }

    #[test]
    fn test_classification_report_fields() {
        let prepared = prepare(&classification_frame(60), "label", SplitSpec::default()).unwrap();
        let outcome = train_classical(
            &prepared,
            ModelKind::Knn,
            ModelParams::default(),
            &ClassicalTrainOptions::default(),
        )
        .unwrap();

        let report = &outcome.report;
        assert!(report.test_accuracy.unwrap() > 0.8);
        assert!(report.precision.is_some());
        assert!(report.confusion_matrix.is_some());
        assert!(report.test_mse.is_none());
        // Binary with a proba-capable model produces a ROC
        assert!(report.roc_curve.is_some());
        assert!(report.auc_score.is_some());
        assert!(!report.cv_scores.is_empty());
        assert!(report.training_time_secs >= 0.0);
    }

    #[test]
    fn test_regression_report_fields() {
        let prepared = prepare(&regression_frame(40), "target", SplitSpec::default()).unwrap();
        let outcome = train_classical(
            &prepared,
            ModelKind::Linear,
            ModelParams::default(),
            &ClassicalTrainOptions::default(),
        )
        .unwrap();

        let report = &outcome.report;
        assert!(report.test_r2.unwrap() > 0.99);
        assert!(report.test_rmse.is_some());
        assert!(report.test_accuracy.is_none());
        assert!(report.roc_curve.is_none());
    }

    #[test]
    fn test_singleton_training_class_skips_cv() {
        // Class 2 has one training member, so CV must be skipped even
        // though a second member sits in the held-out partition.
        let mut train = vec![0.0; 10];
        train.extend(vec![1.0; 10]);
        train.push(2.0);
        let test = vec![2.0, 0.0, 0.0, 1.0, 1.0];

        let prepared = prepared_with_labels(&train, &test);
        let outcome = train_classical(
            &prepared,
            ModelKind::Knn,
            ModelParams::default(),
            &ClassicalTrainOptions::default(),
        )
        .unwrap();
        assert!(outcome.report.cv_scores.is_empty());
        assert!(outcome.report.cv_mean.is_none());
    }

    #[test]
    fn test_rare_training_class_caps_folds() {
        // Rarest training class has 3 members, so 5 requested folds become 3
        let mut train = vec![0.0; 20];
        train.extend(vec![1.0; 3]);
        let test = vec![0.0, 0.0, 1.0, 1.0];

        let prepared = prepared_with_labels(&train, &test);
        let outcome = train_classical(
            &prepared,
            ModelKind::Knn,
            ModelParams::default(),
            &ClassicalTrainOptions::default(),
        )
        .unwrap();
        assert_eq!(outcome.report.cv_scores.len(), 3);
    }

    #[test]
    fn test_forest_reports_importances() {
        let prepared = prepare(&regression_frame(30), "target", SplitSpec::default()).unwrap();
        let params = ModelParams {
            n_estimators: Some(10),
            ..Default::default()
        };
        let outcome = train_classical(
            &prepared,
            ModelKind::RandomForest,
            params,
            &ClassicalTrainOptions::default(),
        )
        .unwrap();
        let imp = outcome.report.feature_importance.as_ref().unwrap();
        assert_eq!(imp.len(), 1);
        assert_eq!(imp[0].feature, "x");
    }
}
