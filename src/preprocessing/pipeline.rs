//! End-to-end feature preparation pipeline

use super::{
    infer_task_type, LabelEncoder, OneHotEncoder, StandardScaler, TaskType, DEFAULT_SEED,
    DEFAULT_TEST_FRACTION, VALIDATION_FRACTION,
};
use crate::error::{Result, TabtrainError};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// How to partition the dataset.
#[derive(Debug, Clone, Copy)]
pub struct SplitSpec {
    pub test_fraction: f64,
    pub seed: u64,
    /// When set, a further validation slice is carved out of the training
    /// partition (used by the neural path for per-epoch monitoring).
    pub validation: bool,
}

impl Default for SplitSpec {
    fn default() -> Self {
        Self {
            test_fraction: DEFAULT_TEST_FRACTION,
            seed: DEFAULT_SEED,
            validation: false,
        }
    }
}

impl SplitSpec {
    pub fn with_test_fraction(mut self, fraction: f64) -> Self {
        self.test_fraction = fraction;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }
}

/// Fully prepared partitions plus the fitted transforms needed to apply the
/// same preparation at inference time.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
    pub x_val: Option<Array2<f64>>,
    pub y_val: Option<Array1<f64>>,
    pub feature_names: Vec<String>,
    pub target_name: String,
    pub task_type: TaskType,
    pub encoder: OneHotEncoder,
    pub scaler: StandardScaler,
    pub label_encoder: Option<LabelEncoder>,
}

/// Prepare a raw frame for training.
///
/// Categorical expansion is fitted on the full feature frame so the encoded
/// width is identical across partitions; the scaler, by contrast, is fitted
/// on the training rows only.
pub fn prepare(df: &DataFrame, target_name: &str, spec: SplitSpec) -> Result<PreparedData> {
    let target = df
        .column(target_name)
        .map_err(|_| TabtrainError::Schema(format!("target column '{}' not found", target_name)))?
        .as_materialized_series()
        .clone();
    let features = df.drop(target_name)?;
    if features.width() == 0 {
        return Err(TabtrainError::Schema("no feature columns remain after dropping the target".to_string()));
    }

    let task_type = infer_task_type(&target);

    let mut encoder = OneHotEncoder::new();
    let x_full = encoder.fit_transform(&features)?;

    let (y_full, label_encoder) = encode_target(&target, task_type)?;

    let n = x_full.nrows();
    if n < 2 {
        return Err(TabtrainError::Data(format!("need at least 2 rows to split, got {}", n)));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(spec.seed);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);

    let n_test = ((n as f64 * spec.test_fraction).ceil() as usize).clamp(1, n - 1);
    let (test_idx, train_idx) = indices.split_at(n_test);
    let mut train_idx = train_idx.to_vec();

    let (val_idx, x_val, y_val);
    if spec.validation && train_idx.len() >= 2 {
        let n_val = ((train_idx.len() as f64 * VALIDATION_FRACTION).ceil() as usize)
            .clamp(1, train_idx.len() - 1);
        val_idx = train_idx.split_off(train_idx.len() - n_val);
        x_val = Some(x_full.select(Axis(0), &val_idx));
        y_val = Some(select_rows(&y_full, &val_idx));
    } else {
        x_val = None;
        y_val = None;
    }

    let x_train_raw = x_full.select(Axis(0), &train_idx);
    let x_test_raw = x_full.select(Axis(0), test_idx);
    let y_train = select_rows(&y_full, &train_idx);
    let y_test = select_rows(&y_full, test_idx);

    let mut scaler = StandardScaler::new();
    let x_train = scaler.fit_transform(&x_train_raw)?;
    let x_test = scaler.transform(&x_test_raw)?;
    let x_val = match x_val {
        Some(v) => Some(scaler.transform(&v)?),
        None => None,
    };

    Ok(PreparedData {
        x_train,
        x_test,
        y_train,
        y_test,
        x_val,
        y_val,
        feature_names: encoder.feature_names().to_vec(),
        target_name: target_name.to_string(),
        task_type,
        encoder,
        scaler,
        label_encoder,
    })
}

fn encode_target(target: &Series, task_type: TaskType) -> Result<(Array1<f64>, Option<LabelEncoder>)> {
    if task_type.is_classification() && !target.dtype().is_primitive_numeric() {
        let mut enc = LabelEncoder::new();
        let y = enc.fit_transform(target)?;
        return Ok((y, Some(enc)));
    }
    let vals = target.cast(&DataType::Float64)?;
    let mut out = Vec::with_capacity(target.len());
    for v in vals.f64()?.into_iter() {
        match v {
            Some(v) => out.push(v),
            None => return Err(TabtrainError::Data("null value in target column".to_string())),
        }
    }
    Ok((Array1::from_vec(out), None))
}

fn select_rows(y: &Array1<f64>, idx: &[usize]) -> Array1<f64> {
    Array1::from_iter(idx.iter().map(|&i| y[i]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame(n: usize) -> DataFrame {
        let a: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let b: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "x" } else { "y" }).collect();
        let y: Vec<f64> = (0..n).map(|i| i as f64 * 2.0 + 1.0).collect();
        df! { "a" => a, "b" => b, "target" => y }.unwrap()
    }

    #[test]
    fn test_split_sizes() {
        let df = sample_frame(100);
        let prepared = prepare(&df, "target", SplitSpec::default()).unwrap();
        assert_eq!(prepared.x_test.nrows(), 20);
        assert_eq!(prepared.x_train.nrows(), 80);
        assert_eq!(prepared.y_train.len(), 80);
        assert_eq!(prepared.task_type, TaskType::Regression);
    }

    #[test]
    fn test_validation_slice() {
        let df = sample_frame(100);
        let spec = SplitSpec::default().with_validation(true);
        let prepared = prepare(&df, "target", spec).unwrap();
        let x_val = prepared.x_val.unwrap();
        assert_eq!(x_val.nrows(), 16);
        assert_eq!(prepared.x_train.nrows(), 64);
        assert_eq!(prepared.x_test.nrows(), 20);
    }

    #[test]
    fn test_feature_name_width_matches_matrix() {
        let df = sample_frame(50);
        let prepared = prepare(&df, "target", SplitSpec::default()).unwrap();
        assert_eq!(prepared.feature_names.len(), prepared.x_train.ncols());
        // "a" numeric plus the non-baseline indicator of "b"
        assert_eq!(prepared.feature_names, vec!["a".to_string(), "b_y".to_string()]);
    }

    #[test]
    fn test_same_seed_same_split() {
        let df = sample_frame(40);
        let p1 = prepare(&df, "target", SplitSpec::default()).unwrap();
        let p2 = prepare(&df, "target", SplitSpec::default()).unwrap();
        assert_eq!(p1.y_test, p2.y_test);
    }

    #[test]
    fn test_text_target_is_label_encoded() {
        let df = df! {
            "a" => [1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            "target" => ["no", "yes", "no", "yes", "no", "yes"],
        }
        .unwrap();
        let prepared = prepare(&df, "target", SplitSpec::default()).unwrap();
        assert_eq!(prepared.task_type, TaskType::Classification);
        let enc = prepared.label_encoder.unwrap();
        assert_eq!(enc.classes(), &["no", "yes"]);
        assert!(prepared.y_train.iter().all(|&v| v == 0.0 || v == 1.0));
    }

    #[test]
    fn test_missing_target_is_schema_error() {
        let df = sample_frame(10);
        let err = prepare(&df, "nope", SplitSpec::default()).unwrap_err();
        assert!(matches!(err, TabtrainError::Schema(_)));
    }
}
