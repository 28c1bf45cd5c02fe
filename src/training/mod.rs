//! Training orchestration: cross-validation, hyperparameter search, and
//! the classical and neural trainers

pub mod classical;
pub mod cross_validation;
pub mod neural;
pub mod search;

pub use classical::{
    train_classical, ClassicalOutcome, ClassicalTrainOptions, DEFAULT_CV_FOLDS,
    MIN_CLASS_COUNT_FOR_CV,
};
pub use cross_validation::{cross_val_score, FoldSplit, KFold};
pub use neural::{
    train_neural, NeuralConfig, NeuralModel, NeuralOutcome, TrainingHistory, DEFAULT_BATCH_SIZE,
    DEFAULT_EPOCHS,
};
pub use search::{param_grid, search, SearchOutcome, SearchStrategy, RANDOM_SEARCH_SAMPLES, SEARCH_FOLDS};
