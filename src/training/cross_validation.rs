//! Seeded k-fold cross-validation

use crate::error::{Result, TabtrainError};
use crate::models::{ClassicalModel, ModelKind, ModelParams};
use crate::preprocessing::TaskType;
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Shuffled k-fold splitter.
#[derive(Debug, Clone, Copy)]
pub struct KFold {
    pub n_splits: usize,
    pub seed: u64,
}

/// One fold's train/test index partition.
#[derive(Debug, Clone)]
pub struct FoldSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

impl KFold {
    pub fn new(n_splits: usize, seed: u64) -> Self {
        Self { n_splits, seed }
    }

    pub fn split(&self, n_samples: usize) -> Result<Vec<FoldSplit>> {
        if self.n_splits < 2 {
            return Err(TabtrainError::Data("n_splits must be at least 2".to_string()));
        }
        if n_samples < self.n_splits {
            return Err(TabtrainError::Data(format!(
                "cannot split {} samples into {} folds",
                n_samples, self.n_splits
            )));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        indices.shuffle(&mut rng);

        // Earlier folds absorb the remainder, one extra sample each.
        let base = n_samples / self.n_splits;
        let remainder = n_samples % self.n_splits;

        let mut splits = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for fold_idx in 0..self.n_splits {
            let size = if fold_idx < remainder { base + 1 } else { base };
            let test_indices = indices[start..start + size].to_vec();
            let train_indices: Vec<usize> = indices[..start]
                .iter()
                .chain(indices[start + size..].iter())
                .copied()
                .collect();
            splits.push(FoldSplit {
                train_indices,
                test_indices,
                fold_idx,
            });
            start += size;
        }
        Ok(splits)
    }
}

/// Per-fold held-out scores for a model family: accuracy for
/// classification, R^2 for regression.
pub fn cross_val_score(
    kind: ModelKind,
    task: TaskType,
    params: &ModelParams,
    x: &Array2<f64>,
    y: &Array1<f64>,
    n_splits: usize,
    seed: u64,
) -> Result<Vec<f64>> {
    let splits = KFold::new(n_splits, seed).split(x.nrows())?;
    let mut scores = Vec::with_capacity(splits.len());
    for split in splits {
        let x_train = x.select(Axis(0), &split.train_indices);
        let y_train = Array1::from_iter(split.train_indices.iter().map(|&i| y[i]));
        let x_test = x.select(Axis(0), &split.test_indices);
        let y_test = Array1::from_iter(split.test_indices.iter().map(|&i| y[i]));

        let mut model = ClassicalModel::build(kind, task, params);
        model.fit(&x_train, &y_train)?;
        let preds = model.predict(&x_test)?;

        let score = if task.is_classification() {
            crate::metrics::accuracy_score(&y_test, &preds)
        } else {
            crate::metrics::r2_score(&y_test, &preds)
        };
        scores.push(score);
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folds_partition_all_samples() {
        let splits = KFold::new(5, 42).split(103).unwrap();
        assert_eq!(splits.len(), 5);
        let mut all: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all.sort_unstable();
        assert_eq!(all, (0..103).collect::<Vec<_>>());
        // 103 = 3 folds of 21 + 2 folds of 20
        assert_eq!(splits[0].test_indices.len(), 21);
        assert_eq!(splits[4].test_indices.len(), 20);
    }

    #[test]
    fn test_same_seed_same_folds() {
        let a = KFold::new(3, 7).split(30).unwrap();
        let b = KFold::new(3, 7).split(30).unwrap();
        for (sa, sb) in a.iter().zip(b.iter()) {
            assert_eq!(sa.test_indices, sb.test_indices);
        }
    }

    #[test]
    fn test_too_few_samples_rejected() {
        assert!(KFold::new(5, 42).split(3).is_err());
    }

    #[test]
    fn test_cross_val_score_on_separable_data() {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..30 {
            let offset = if i % 2 == 0 { 0.0 } else { 10.0 };
            rows.push([offset + (i as f64) * 0.01]);
            labels.push(if i % 2 == 0 { 0.0 } else { 1.0 });
        }
        let x = Array2::from_shape_vec((30, 1), rows.concat()).unwrap();
        let y = Array1::from_vec(labels);

        let scores = cross_val_score(
            ModelKind::Knn,
            TaskType::Classification,
            &ModelParams::default(),
            &x,
            &y,
            3,
            42,
        )
        .unwrap();
        assert_eq!(scores.len(), 3);
        for s in scores {
            assert!(s > 0.8, "fold score {}", s);
        }
    }

    #[test]
    fn test_fold_indices_disjoint() {
        let splits = KFold::new(4, 1).split(20).unwrap();
        for split in &splits {
            for idx in &split.test_indices {
                assert!(!split.train_indices.contains(idx));
            }
        }
    }
}
