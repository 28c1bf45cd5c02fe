//! Evaluation metrics and the per-training report

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// ROC curve points plus the decision thresholds that generated them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub thresholds: Vec<f64>,
}

/// One feature with its importance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Everything a training run reports about model quality.
///
/// Fields that do not apply to the task, or whose computation was skipped
/// (multiclass ROC, degenerate cross-validation), stay None and are omitted
/// from the serialized form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub train_accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recall: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub f1_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confusion_matrix: Option<Vec<Vec<usize>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roc_curve: Option<RocCurve>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auc_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub train_mse: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub train_r2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_mse: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_mae: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_rmse: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_r2: Option<f64>,
    /// Terminal loss on the held-out partition (neural runs only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_loss: Option<f64>,
    /// Per-fold scores; empty when cross-validation was skipped.
    pub cv_scores: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv_mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv_std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_importance: Option<Vec<FeatureImportance>>,
    pub training_time_secs: f64,
}

impl MetricsReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach per-fold CV scores, updating mean and std.
    pub fn set_cv_scores(&mut self, scores: Vec<f64>) {
        if scores.is_empty() {
            self.cv_scores = scores;
            self.cv_mean = None;
            self.cv_std = None;
            return;
        }
        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let var = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        self.cv_mean = Some(mean);
        self.cv_std = Some(var.sqrt());
        self.cv_scores = scores;
    }

    /// Pair importances with feature names and sort descending.
    pub fn set_feature_importance(&mut self, names: &[String], importances: &Array1<f64>) {
        let mut pairs: Vec<FeatureImportance> = names
            .iter()
            .zip(importances.iter())
            .map(|(feature, &importance)| FeatureImportance {
                feature: feature.clone(),
                importance,
            })
            .collect();
        pairs.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        self.feature_importance = Some(pairs);
    }
}

/// Fraction of matching labels.
pub fn accuracy_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| t.round() as i64 == p.round() as i64)
        .count();
    correct as f64 / y_true.len() as f64
}

fn sorted_classes(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Vec<i64> {
    let mut classes: Vec<i64> = y_true
        .iter()
        .chain(y_pred.iter())
        .map(|&v| v.round() as i64)
        .collect();
    classes.sort_unstable();
    classes.dedup();
    classes
}

/// Support-weighted precision, recall, and F1. Classes with no predicted
/// (or no true) members contribute zero rather than poisoning the average.
pub fn precision_recall_f1(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> (f64, f64, f64) {
    let classes = sorted_classes(y_true, y_pred);
    let total = y_true.len() as f64;
    if total == 0.0 {
        return (0.0, 0.0, 0.0);
    }

    let mut precision = 0.0;
    let mut recall = 0.0;
    let mut f1 = 0.0;
    for &class in &classes {
        let mut tp = 0.0;
        let mut fp = 0.0;
        let mut fn_ = 0.0;
        let mut support = 0.0;
        for (t, p) in y_true.iter().zip(y_pred.iter()) {
            let t_is = t.round() as i64 == class;
            let p_is = p.round() as i64 == class;
            if t_is {
                support += 1.0;
            }
            match (t_is, p_is) {
                (true, true) => tp += 1.0,
                (false, true) => fp += 1.0,
                (true, false) => fn_ += 1.0,
                (false, false) => {}
            }
        }
        let p = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
        let r = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
        let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };
        let weight = support / total;
        precision += weight * p;
        recall += weight * r;
        f1 += weight * f;
    }
    (precision, recall, f1)
}

/// Row-per-true-class confusion counts over the sorted class set.
pub fn confusion_matrix(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Vec<Vec<usize>> {
    let classes = sorted_classes(y_true, y_pred);
    let index: HashMap<i64, usize> =
        classes.iter().enumerate().map(|(i, &c)| (c, i)).collect();
    let mut matrix = vec![vec![0usize; classes.len()]; classes.len()];
    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        let ti = index[&(t.round() as i64)];
        let pi = index[&(p.round() as i64)];
        matrix[ti][pi] += 1;
    }
    matrix
}

/// Binary ROC curve from positive-class scores. Returns None when the true
/// labels do not contain both classes, which would make the rates
/// undefined.
pub fn roc_curve(y_true: &Array1<f64>, scores: &Array1<f64>) -> Option<RocCurve> {
    let n_pos = y_true.iter().filter(|&&v| v.round() as i64 == 1).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut thresholds: Vec<f64> = scores.to_vec();
    thresholds.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    thresholds.dedup();
    thresholds.insert(0, f64::INFINITY);

    let mut fpr = Vec::with_capacity(thresholds.len());
    let mut tpr = Vec::with_capacity(thresholds.len());
    for &threshold in &thresholds {
        let mut tp = 0usize;
        let mut fp = 0usize;
        for (t, s) in y_true.iter().zip(scores.iter()) {
            if *s >= threshold {
                if t.round() as i64 == 1 {
                    tp += 1;
                } else {
                    fp += 1;
                }
            }
        }
        tpr.push(tp as f64 / n_pos as f64);
        fpr.push(fp as f64 / n_neg as f64);
    }

    Some(RocCurve { fpr, tpr, thresholds })
}

/// Trapezoidal area under the ROC curve.
pub fn auc(curve: &RocCurve) -> f64 {
    let mut area = 0.0;
    for pair in curve.fpr.windows(2).zip(curve.tpr.windows(2)) {
        let (f, t) = pair;
        area += (f[1] - f[0]) * (t[0] + t[1]) / 2.0;
    }
    area
}

pub fn mean_squared_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / y_true.len() as f64
}

pub fn mean_absolute_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / y_true.len() as f64
}

/// Coefficient of determination; 0.0 for a constant target.
pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return 0.0;
    }
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    1.0 - ss_res / ss_tot
}

/// Positive-class probability column for binary problems: the second
/// column when the model emits two, the single column otherwise.
pub fn positive_class_scores(proba: &Array2<f64>) -> Option<Array1<f64>> {
    match proba.ncols() {
        1 => Some(proba.column(0).to_owned()),
        2 => Some(proba.column(1).to_owned()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_accuracy() {
        let y_true = array![0.0, 1.0, 1.0, 0.0];
        let y_pred = array![0.0, 1.0, 0.0, 0.0];
        assert!((accuracy_score(&y_true, &y_pred) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_perfect_weighted_scores() {
        let y = array![0.0, 1.0, 2.0, 1.0, 0.0, 2.0];
        let (p, r, f1) = precision_recall_f1(&y, &y);
        assert!((p - 1.0).abs() < 1e-12);
        assert!((r - 1.0).abs() < 1e-12);
        assert!((f1 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_never_predicted_class_scores_zero_not_nan() {
        let y_true = array![0.0, 1.0, 1.0];
        let y_pred = array![0.0, 0.0, 0.0];
        let (p, r, f1) = precision_recall_f1(&y_true, &y_pred);
        assert!(p.is_finite() && r.is_finite() && f1.is_finite());
        assert!(r < 1.0);
    }

    #[test]
    fn test_confusion_matrix_layout() {
        let y_true = array![0.0, 0.0, 1.0, 1.0];
        let y_pred = array![0.0, 1.0, 1.0, 1.0];
        let m = confusion_matrix(&y_true, &y_pred);
        assert_eq!(m, vec![vec![1, 1], vec![0, 2]]);
    }

    #[test]
    fn test_perfect_roc_auc_is_one() {
        let y_true = array![0.0, 0.0, 1.0, 1.0];
        let scores = array![0.1, 0.2, 0.8, 0.9];
        let curve = roc_curve(&y_true, &scores).unwrap();
        assert!((auc(&curve) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_roc_none_for_single_class() {
        let y_true = array![1.0, 1.0, 1.0];
        let scores = array![0.5, 0.6, 0.7];
        assert!(roc_curve(&y_true, &scores).is_none());
    }

    #[test]
    fn test_r2_constant_target_is_zero() {
        let y_true = array![3.0, 3.0, 3.0];
        let y_pred = array![2.0, 3.0, 4.0];
        assert_eq!(r2_score(&y_true, &y_pred), 0.0);
    }

    #[test]
    fn test_report_skips_absent_fields() {
        let mut report = MetricsReport::new();
        report.test_mse = Some(1.5);
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("test_mse").is_some());
        assert!(json.get("test_accuracy").is_none());
        assert!(json.get("roc_curve").is_none());
    }

    #[test]
    fn test_cv_summary() {
        let mut report = MetricsReport::new();
        report.set_cv_scores(vec![0.8, 0.9, 1.0]);
        assert!((report.cv_mean.unwrap() - 0.9).abs() < 1e-12);
        assert!(report.cv_std.unwrap() > 0.0);

        report.set_cv_scores(Vec::new());
        assert!(report.cv_mean.is_none());
    }

    #[test]
    fn test_feature_importance_sorted_desc() {
        let mut report = MetricsReport::new();
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        report.set_feature_importance(&names, &array![0.1, 0.7, 0.2]);
        let imp = report.feature_importance.unwrap();
        assert_eq!(imp[0].feature, "b");
        assert_eq!(imp[2].feature, "a");
    }
}
