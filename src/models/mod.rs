//! Classical model families and the registry that constructs them

mod boosting;
mod forest;
mod knn;
mod linear;
mod registry;
mod svm;
mod tree;

pub use boosting::{GradientBoosting, DEFAULT_LEARNING_RATE, DEFAULT_STAGE_DEPTH};
pub use forest::{RandomForest, DEFAULT_N_ESTIMATORS};
pub use knn::{KNearestNeighbors, WeightScheme, DEFAULT_K};
pub use linear::{LinearRegression, LogisticRegression};
pub use registry::{ClassicalModel, ModelKind, ModelParams};
pub use svm::{Kernel, SupportVectorMachine, DEFAULT_C};
pub use tree::{Criterion, DecisionTree};
