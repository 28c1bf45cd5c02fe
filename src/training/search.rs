//! Hyperparameter search over per-family candidate grids

use super::cross_validation::cross_val_score;
use crate::error::{Result, TabtrainError};
use crate::models::{Kernel, ModelKind, ModelParams, WeightScheme};
use crate::preprocessing::TaskType;
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

/// Folds used to score each candidate.
pub const SEARCH_FOLDS: usize = 3;

/// Candidates drawn by random search.
pub const RANDOM_SEARCH_SAMPLES: usize = 10;

/// How to walk the candidate grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    /// Every combination.
    Grid,
    /// A seeded sample of the grid, without replacement.
    Random { n_iter: usize },
}

impl SearchStrategy {
    /// Random search at the default sample budget.
    pub fn random() -> Self {
        SearchStrategy::Random {
            n_iter: RANDOM_SEARCH_SAMPLES,
        }
    }
}

/// Winning candidate and its cross-validated score.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best_params: ModelParams,
    pub best_score: f64,
    pub n_candidates: usize,
}

/// The fixed candidate grid for a model family. Families without tunable
/// hyperparameters get their single default candidate.
pub fn param_grid(kind: ModelKind) -> Vec<ModelParams> {
    match kind {
        ModelKind::RandomForest => {
            let mut grid = Vec::new();
            for &n in &[50usize, 100, 200] {
                for &depth in &[None, Some(10usize), Some(20), Some(30)] {
                    for &min_split in &[2usize, 5, 10] {
                        grid.push(ModelParams {
                            n_estimators: Some(n),
                            max_depth: depth,
                            min_samples_split: Some(min_split),
                            ..Default::default()
                        });
                    }
                }
            }
            grid
        }
        ModelKind::GradientBoosting => {
            let mut grid = Vec::new();
            for &n in &[50usize, 100, 200] {
                for &lr in &[0.01, 0.1, 0.2] {
                    for &depth in &[3usize, 5, 7] {
                        grid.push(ModelParams {
                            n_estimators: Some(n),
                            learning_rate: Some(lr),
                            max_depth: Some(depth),
                            ..Default::default()
                        });
                    }
                }
            }
            grid
        }
        ModelKind::Svm => {
            let mut grid = Vec::new();
            for &c in &[0.1, 1.0, 10.0] {
                for &kernel in &[Kernel::Rbf { gamma: None }, Kernel::Linear] {
                    grid.push(ModelParams {
                        c: Some(c),
                        kernel: Some(kernel),
                        ..Default::default()
                    });
                }
            }
            grid
        }
        ModelKind::Knn => {
            let mut grid = Vec::new();
            for &k in &[3usize, 5, 7, 9] {
                for &weights in &[WeightScheme::Uniform, WeightScheme::Distance] {
                    grid.push(ModelParams {
                        k: Some(k),
                        weights: Some(weights),
                        ..Default::default()
                    });
                }
            }
            grid
        }
        ModelKind::Linear => vec![ModelParams::default()],
    }
}

/// Score every candidate with k-fold cross-validation and keep the best
/// mean score. Ties keep the earlier candidate, so grid order decides.
pub fn search(
    kind: ModelKind,
    task: TaskType,
    x: &Array2<f64>,
    y: &Array1<f64>,
    strategy: SearchStrategy,
    seed: u64,
) -> Result<SearchOutcome> {
    let mut candidates = param_grid(kind);
    if let SearchStrategy::Random { n_iter } = strategy {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        candidates.shuffle(&mut rng);
        candidates.truncate(n_iter.max(1));
    }

    let mut best: Option<(ModelParams, f64)> = None;
    let n_candidates = candidates.len();
    for params in candidates {
        let scores = cross_val_score(kind, task, &params, x, y, SEARCH_FOLDS, seed)?;
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        debug!(model = %kind, score = mean, "scored search candidate");
        if best.as_ref().map_or(true, |(_, s)| mean > *s) {
            best = Some((params, mean));
        }
    }

    let (best_params, best_score) = best.ok_or_else(|| {
        TabtrainError::NumericFit("hyperparameter search produced no candidates".to_string())
    })?;
    Ok(SearchOutcome {
        best_params,
        best_score,
        n_candidates,
    })
}
