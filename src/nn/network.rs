//! Feed-forward network with dropout

use crate::error::{Result, TabtrainError};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Fixed dropout probability applied to every hidden layer.
pub const DROPOUT_RATE: f64 = 0.2;

const SQRT_2_OVER_PI: f64 = 0.7978845608028654;
const LEAKY_SLOPE: f64 = 0.01;

/// Hidden layer nonlinearity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Relu,
    LeakyRelu,
    Sigmoid,
    Tanh,
    Gelu,
}

impl Activation {
    /// Parse a requested activation name, falling back to ReLU for
    /// anything unrecognized.
    pub fn parse(name: &str) -> Self {
        match name {
            "relu" => Activation::Relu,
            "leaky_relu" => Activation::LeakyRelu,
            "sigmoid" => Activation::Sigmoid,
            "tanh" => Activation::Tanh,
            "gelu" => Activation::Gelu,
            other => {
                warn!(activation = other, "unknown activation, using relu");
                Activation::Relu
            }
        }
    }

    fn apply(self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Relu => z.mapv(|v| v.max(0.0)),
            Activation::LeakyRelu => z.mapv(|v| if v > 0.0 { v } else { LEAKY_SLOPE * v }),
            Activation::Sigmoid => z.mapv(sigmoid),
            Activation::Tanh => z.mapv(f64::tanh),
            Activation::Gelu => z.mapv(gelu),
        }
    }

    fn derivative(self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Relu => z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::LeakyRelu => z.mapv(|v| if v > 0.0 { 1.0 } else { LEAKY_SLOPE }),
            Activation::Sigmoid => z.mapv(|v| {
                let s = sigmoid(v);
                s * (1.0 - s)
            }),
            Activation::Tanh => z.mapv(|v| 1.0 - v.tanh().powi(2)),
            Activation::Gelu => z.mapv(gelu_derivative),
        }
    }
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// Tanh approximation of GELU.
fn gelu(x: f64) -> f64 {
    0.5 * x * (1.0 + (SQRT_2_OVER_PI * (x + 0.044715 * x.powi(3))).tanh())
}

fn gelu_derivative(x: f64) -> f64 {
    let u = SQRT_2_OVER_PI * (x + 0.044715 * x.powi(3));
    let t = u.tanh();
    let sech2 = 1.0 - t * t;
    0.5 * (1.0 + t) + 0.5 * x * sech2 * SQRT_2_OVER_PI * (1.0 + 3.0 * 0.044715 * x * x)
}

/// Loss applied at the output layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Loss {
    /// Softmax cross-entropy over class logits.
    CrossEntropy,
    /// Elementwise sigmoid cross-entropy over one-hot targets.
    BceWithLogits,
    MeanSquaredError,
    MeanAbsoluteError,
}

impl Loss {
    /// Resolve a requested loss name against the task. Names that do not
    /// fit the task fall back to its default with a warning.
    pub fn resolve(name: &str, is_classification: bool) -> Self {
        if is_classification {
            match name {
                "cross_entropy" | "ce" => Loss::CrossEntropy,
                "bce_with_logits" | "bce" => Loss::BceWithLogits,
                other => {
                    warn!(loss = other, "unsupported classification loss, using cross_entropy");
                    Loss::CrossEntropy
                }
            }
        } else {
            match name {
                "mse" => Loss::MeanSquaredError,
                "mae" => Loss::MeanAbsoluteError,
                other => {
                    warn!(loss = other, "unsupported regression loss, using mse");
                    Loss::MeanSquaredError
                }
            }
        }
    }

    /// Loss value on raw outputs against targets.
    pub fn value(self, output: &Array2<f64>, targets: &Array2<f64>) -> f64 {
        let n = output.nrows() as f64;
        match self {
            Loss::CrossEntropy => {
                let probs = softmax_rows(output);
                -targets
                    .iter()
                    .zip(probs.iter())
                    .map(|(&t, &p)| t * p.max(1e-15).ln())
                    .sum::<f64>()
                    / n
            }
            Loss::BceWithLogits => {
                output
                    .iter()
                    .zip(targets.iter())
                    .map(|(&z, &t)| {
                        let p = sigmoid(z).clamp(1e-15, 1.0 - 1e-15);
                        -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
                    })
                    .sum::<f64>()
                    / (n * output.ncols() as f64)
            }
            Loss::MeanSquaredError => {
                output
                    .iter()
                    .zip(targets.iter())
                    .map(|(&o, &t)| (o - t).powi(2))
                    .sum::<f64>()
                    / n
            }
            Loss::MeanAbsoluteError => {
                output
                    .iter()
                    .zip(targets.iter())
                    .map(|(&o, &t)| (o - t).abs())
                    .sum::<f64>()
                    / n
            }
        }
    }

    /// Gradient of the loss with respect to the raw output.
    fn gradient(self, output: &Array2<f64>, targets: &Array2<f64>) -> Array2<f64> {
        let n = output.nrows() as f64;
        match self {
            Loss::CrossEntropy => (softmax_rows(output) - targets) / n,
            Loss::BceWithLogits => (output.mapv(sigmoid) - targets) / n,
            Loss::MeanSquaredError => (output - targets).mapv(|v| 2.0 * v / n),
            Loss::MeanAbsoluteError => (output - targets).mapv(|v| v.signum() / n),
        }
    }
}

fn softmax_rows(z: &Array2<f64>) -> Array2<f64> {
    let mut out = z.clone();
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
    out
}

/// Per-layer gradients from one backward pass.
pub struct Gradients {
    pub weights: Vec<Array2<f64>>,
    pub biases: Vec<Array1<f64>>,
}

/// Forward-pass caches needed by backprop.
struct ForwardCache {
    /// Post-activation values, input included.
    activations: Vec<Array2<f64>>,
    /// Pre-activation values per layer.
    zs: Vec<Array2<f64>>,
    /// Inverted-dropout masks per hidden layer (empty at inference).
    masks: Vec<Array2<f64>>,
}

/// Fully connected multilayer perceptron.
///
/// Hidden layers share one activation and carry inverted dropout during
/// training; the output layer is linear (losses own the link function).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedForwardNet {
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    pub activation: Activation,
    pub dropout: f64,
}

impl FeedForwardNet {
    /// Build with Xavier-style uniform initialization.
    pub fn new(
        input_dim: usize,
        hidden_layers: &[usize],
        output_dim: usize,
        activation: Activation,
        dropout: f64,
        seed: u64,
    ) -> Result<Self> {
        if input_dim == 0 || output_dim == 0 {
            return Err(TabtrainError::Data("network dimensions must be nonzero".to_string()));
        }
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);

        let mut sizes = vec![input_dim];
        sizes.extend_from_slice(hidden_layers);
        sizes.push(output_dim);

        let mut weights = Vec::with_capacity(sizes.len() - 1);
        let mut biases = Vec::with_capacity(sizes.len() - 1);
        for pair in sizes.windows(2) {
            let (n_in, n_out) = (pair[0], pair[1]);
            let scale = (2.0 / (n_in + n_out) as f64).sqrt();
            let w = Array2::from_shape_fn((n_in, n_out), |_| rng.gen::<f64>() * 2.0 * scale - scale);
            weights.push(w);
            biases.push(Array1::zeros(n_out));
        }

        Ok(Self {
            weights,
            biases,
            activation,
            dropout: dropout.clamp(0.0, 0.95),
        })
    }

    pub fn output_dim(&self) -> usize {
        self.biases.last().map_or(0, |b| b.len())
    }

    /// Trainable parameter count, weights plus biases.
    pub fn parameter_count(&self) -> usize {
        let w: usize = self.weights.iter().map(|w| w.len()).sum();
        let b: usize = self.biases.iter().map(|b| b.len()).sum();
        w + b
    }

    fn forward(&self, x: &Array2<f64>, rng: Option<&mut Xoshiro256PlusPlus>) -> ForwardCache {
        let n_layers = self.weights.len();
        let mut activations = vec![x.clone()];
        let mut zs = Vec::with_capacity(n_layers);
        let mut masks = Vec::new();
        let mut dropout_rng = rng;

        for (i, (w, b)) in self.weights.iter().zip(self.biases.iter()).enumerate() {
            let z = activations[i].dot(w) + b;
            let is_output = i == n_layers - 1;
            let mut a = if is_output { z.clone() } else { self.activation.apply(&z) };

            if !is_output {
                if let Some(rng) = dropout_rng.as_deref_mut() {
                    if self.dropout > 0.0 {
                        let keep = 1.0 - self.dropout;
                        let mask = Array2::from_shape_fn(a.raw_dim(), |_| {
                            if rng.gen::<f64>() < keep {
                                1.0 / keep
                            } else {
                                0.0
                            }
                        });
                        a = &a * &mask;
                        masks.push(mask);
                    }
                }
            }

            zs.push(z);
            activations.push(a);
        }

        ForwardCache { activations, zs, masks }
    }

    /// Inference pass: no dropout, raw linear outputs.
    pub fn predict_raw(&self, x: &Array2<f64>) -> Array2<f64> {
        let cache = self.forward(x, None);
        cache.activations.last().cloned().unwrap_or_else(|| x.clone())
    }

    /// One training step's loss and gradients on a batch.
    pub fn backprop(
        &self,
        x: &Array2<f64>,
        targets: &Array2<f64>,
        loss: Loss,
        rng: &mut Xoshiro256PlusPlus,
    ) -> (f64, Gradients) {
        let cache = self.forward(x, Some(rng));
        let output = cache.activations.last().cloned().unwrap_or_else(|| x.clone());
        let loss_value = loss.value(&output, targets);

        let n_layers = self.weights.len();
        let mut grad_w = vec![Array2::zeros((0, 0)); n_layers];
        let mut grad_b = vec![Array1::zeros(0); n_layers];

        let mut delta = loss.gradient(&output, targets);
        for i in (0..n_layers).rev() {
            grad_w[i] = cache.activations[i].t().dot(&delta);
            grad_b[i] = delta.sum_axis(Axis(0));
            if i > 0 {
                delta = delta.dot(&self.weights[i].t()) * self.activation.derivative(&cache.zs[i - 1]);
                if let Some(mask) = cache.masks.get(i - 1) {
                    delta = &delta * mask;
                }
            }
        }

        (
            loss_value,
            Gradients {
                weights: grad_w,
                biases: grad_b,
            },
        )
    }

    pub fn weights_mut(&mut self) -> (&mut Vec<Array2<f64>>, &mut Vec<Array1<f64>>) {
        (&mut self.weights, &mut self.biases)
    }

    pub fn layer_shapes(&self) -> Vec<(usize, usize)> {
        self.weights.iter().map(|w| (w.nrows(), w.ncols())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_activation_parse_fallback() {
        assert_eq!(Activation::parse("gelu"), Activation::Gelu);
        assert_eq!(Activation::parse("swish"), Activation::Relu);
    }

    #[test]
    fn test_loss_resolve_respects_task() {
        assert_eq!(Loss::resolve("mse", false), Loss::MeanSquaredError);
        assert_eq!(Loss::resolve("mse", true), Loss::CrossEntropy);
        assert_eq!(Loss::resolve("bce_with_logits", true), Loss::BceWithLogits);
        assert_eq!(Loss::resolve("huber", false), Loss::MeanSquaredError);
    }

    #[test]
    fn test_parameter_count() {
        let net = FeedForwardNet::new(4, &[8, 3], 2, Activation::Relu, 0.0, 1).unwrap();
        // 4*8+8 + 8*3+3 + 3*2+2 = 40 + 27 + 8
        assert_eq!(net.parameter_count(), 75);
    }

    #[test]
    fn test_predict_shape() {
        let net = FeedForwardNet::new(3, &[5], 2, Activation::Tanh, DROPOUT_RATE, 7).unwrap();
        let x = Array2::zeros((4, 3));
        let out = net.predict_raw(&x);
        assert_eq!(out.dim(), (4, 2));
    }

    #[test]
    fn test_inference_is_deterministic_despite_dropout() {
        let net = FeedForwardNet::new(2, &[6], 1, Activation::Relu, DROPOUT_RATE, 3).unwrap();
        let x = array![[0.5, -0.5], [1.0, 2.0]];
        assert_eq!(net.predict_raw(&x), net.predict_raw(&x));
    }

    #[test]
    fn test_cross_entropy_gradient_direction() {
        let output = array![[2.0, -2.0]];
        let targets = array![[0.0, 1.0]];
        let grad = Loss::CrossEntropy.gradient(&output, &targets);
        // Confidently wrong prediction: push logit 0 down, logit 1 up
        assert!(grad[[0, 0]] > 0.0);
        assert!(grad[[0, 1]] < 0.0);
    }

    #[test]
    fn test_backprop_reduces_loss_with_sgd_steps() {
        let mut net = FeedForwardNet::new(1, &[8], 1, Activation::Tanh, 0.0, 11).unwrap();
        let x = array![[0.0], [0.5], [1.0]];
        let targets = array![[0.0], [1.0], [2.0]];
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);

        let (initial, _) = net.backprop(&x, &targets, Loss::MeanSquaredError, &mut rng);
        for _ in 0..200 {
            let (_, grads) = net.backprop(&x, &targets, Loss::MeanSquaredError, &mut rng);
            let (weights, biases) = net.weights_mut();
            for (w, g) in weights.iter_mut().zip(grads.weights.iter()) {
                *w = &*w - &g.mapv(|v| v * 0.1);
            }
            for (b, g) in biases.iter_mut().zip(grads.biases.iter()) {
                *b = &*b - &g.mapv(|v| v * 0.1);
            }
        }
        let (final_loss, _) = net.backprop(&x, &targets, Loss::MeanSquaredError, &mut rng);
        assert!(final_loss < initial, "loss {} -> {}", initial, final_loss);
    }
}
