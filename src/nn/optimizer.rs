//! Parameter update rules for the neural trainer

use super::network::{FeedForwardNet, Gradients};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default step size.
pub const DEFAULT_LEARNING_RATE: f64 = 0.001;

/// Momentum used by plain SGD.
pub const SGD_MOMENTUM: f64 = 0.9;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPS: f64 = 1e-8;
const WEIGHT_DECAY: f64 = 0.01;
const RMS_DECAY: f64 = 0.99;

/// The supported update rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Adam,
    Sgd,
    AdamW,
    RmsProp,
}

impl OptimizerKind {
    /// Parse a requested optimizer name, falling back to Adam.
    pub fn parse(name: &str) -> Self {
        match name {
            "adam" => OptimizerKind::Adam,
            "sgd" => OptimizerKind::Sgd,
            "adamw" => OptimizerKind::AdamW,
            "rmsprop" => OptimizerKind::RmsProp,
            other => {
                warn!(optimizer = other, "unknown optimizer, using adam");
                OptimizerKind::Adam
            }
        }
    }
}

/// Optimizer with per-tensor state. First and second moment buffers are
/// allocated lazily against the network's layer shapes.
#[derive(Debug, Clone)]
pub struct Optimizer {
    pub kind: OptimizerKind,
    pub learning_rate: f64,
    step: usize,
    m_w: Vec<Array2<f64>>,
    v_w: Vec<Array2<f64>>,
    m_b: Vec<Array1<f64>>,
    v_b: Vec<Array1<f64>>,
}

impl Optimizer {
    pub fn new(kind: OptimizerKind, learning_rate: f64, net: &FeedForwardNet) -> Self {
        let shapes = net.layer_shapes();
        let m_w = shapes.iter().map(|&(r, c)| Array2::zeros((r, c))).collect::<Vec<_>>();
        let v_w = m_w.clone();
        let m_b: Vec<Array1<f64>> = shapes.iter().map(|&(_, c)| Array1::zeros(c)).collect();
        let v_b = m_b.clone();
        Self {
            kind,
            learning_rate,
            step: 0,
            m_w,
            v_w,
            m_b,
            v_b,
        }
    }

    /// Apply one gradient step to every layer.
    pub fn apply(&mut self, net: &mut FeedForwardNet, grads: &Gradients) {
        self.step += 1;
        let step = self.step;
        let lr = self.learning_rate;
        let kind = self.kind;
        let (weights, biases) = net.weights_mut();

        for i in 0..weights.len() {
            match kind {
                OptimizerKind::Adam | OptimizerKind::AdamW => {
                    if kind == OptimizerKind::AdamW {
                        // Decoupled weight decay, applied to weights only.
                        weights[i].mapv_inplace(|v| v * (1.0 - lr * WEIGHT_DECAY));
                    }
                    adam_step(&mut self.m_w[i], &mut self.v_w[i], &mut weights[i], &grads.weights[i], lr, step);
                    adam_step_1d(&mut self.m_b[i], &mut self.v_b[i], &mut biases[i], &grads.biases[i], lr, step);
                }
                OptimizerKind::Sgd => {
                    self.m_w[i] = &self.m_w[i] * SGD_MOMENTUM - &grads.weights[i].mapv(|v| v * lr);
                    weights[i] = &weights[i] + &self.m_w[i];
                    self.m_b[i] = &self.m_b[i] * SGD_MOMENTUM - &grads.biases[i].mapv(|v| v * lr);
                    biases[i] = &biases[i] + &self.m_b[i];
                }
                OptimizerKind::RmsProp => {
                    self.v_w[i] =
                        &self.v_w[i] * RMS_DECAY + &grads.weights[i].mapv(|g| (1.0 - RMS_DECAY) * g * g);
                    let update = &grads.weights[i] / &self.v_w[i].mapv(|v| v.sqrt() + EPS);
                    weights[i] = &weights[i] - &update.mapv(|v| v * lr);
                    self.v_b[i] =
                        &self.v_b[i] * RMS_DECAY + &grads.biases[i].mapv(|g| (1.0 - RMS_DECAY) * g * g);
                    let update_b = &grads.biases[i] / &self.v_b[i].mapv(|v| v.sqrt() + EPS);
                    biases[i] = &biases[i] - &update_b.mapv(|v| v * lr);
                }
            }
        }
    }
}

fn adam_step(
    m: &mut Array2<f64>,
    v: &mut Array2<f64>,
    param: &mut Array2<f64>,
    grad: &Array2<f64>,
    lr: f64,
    step: usize,
) {
    *m = &*m * BETA1 + &grad.mapv(|g| (1.0 - BETA1) * g);
    *v = &*v * BETA2 + &grad.mapv(|g| (1.0 - BETA2) * g * g);
    let correction1 = 1.0 - BETA1.powi(step as i32);
    let correction2 = 1.0 - BETA2.powi(step as i32);
    let m_hat = m.mapv(|x| x / correction1);
    let v_hat = v.mapv(|x| x / correction2);
    *param = &*param - &(m_hat / v_hat.mapv(|x| x.sqrt() + EPS)).mapv(|x| x * lr);
}

fn adam_step_1d(
    m: &mut Array1<f64>,
    v: &mut Array1<f64>,
    param: &mut Array1<f64>,
    grad: &Array1<f64>,
    lr: f64,
    step: usize,
) {
    *m = &*m * BETA1 + &grad.mapv(|g| (1.0 - BETA1) * g);
    *v = &*v * BETA2 + &grad.mapv(|g| (1.0 - BETA2) * g * g);
    let correction1 = 1.0 - BETA1.powi(step as i32);
    let correction2 = 1.0 - BETA2.powi(step as i32);
    let m_hat = m.mapv(|x| x / correction1);
    let v_hat = v.mapv(|x| x / correction2);
    *param = &*param - &(m_hat / v_hat.mapv(|x| x.sqrt() + EPS)).mapv(|x| x * lr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::network::{Activation, Loss};
    use ndarray::array;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_optimizer_parse_fallback() {
        assert_eq!(OptimizerKind::parse("adamw"), OptimizerKind::AdamW);
        assert_eq!(OptimizerKind::parse("lbfgs"), OptimizerKind::Adam);
    }

    fn train_with(kind: OptimizerKind) -> (f64, f64) {
        let mut net = FeedForwardNet::new(1, &[8], 1, Activation::Tanh, 0.0, 5).unwrap();
        let mut opt = Optimizer::new(kind, 0.01, &net);
        let x = array![[0.0], [0.5], [1.0], [1.5]];
        let t = array![[0.0], [0.5], [1.0], [1.5]];
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(9);

        let (initial, _) = net.backprop(&x, &t, Loss::MeanSquaredError, &mut rng);
        for _ in 0..300 {
            let (_, grads) = net.backprop(&x, &t, Loss::MeanSquaredError, &mut rng);
            opt.apply(&mut net, &grads);
        }
        let (final_loss, _) = net.backprop(&x, &t, Loss::MeanSquaredError, &mut rng);
        (initial, final_loss)
    }

    #[test]
    fn test_all_optimizers_reduce_loss() {
        for kind in [
            OptimizerKind::Adam,
            OptimizerKind::Sgd,
            OptimizerKind::AdamW,
            OptimizerKind::RmsProp,
        ] {
            let (initial, final_loss) = train_with(kind);
            assert!(
                final_loss < initial,
                "{:?}: loss {} -> {}",
                kind,
                initial,
                final_loss
            );
        }
    }
}
