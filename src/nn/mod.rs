//! Neural building blocks: the feed-forward network, its losses and
//! activations, and the optimizers that train it

pub mod network;
pub mod optimizer;

pub use network::{Activation, FeedForwardNet, Gradients, Loss, DROPOUT_RATE};
pub use optimizer::{Optimizer, OptimizerKind, DEFAULT_LEARNING_RATE, SGD_MOMENTUM};
