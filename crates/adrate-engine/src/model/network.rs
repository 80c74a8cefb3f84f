use crate::features::FEATURE_COUNT;
use candle_core::{Module, Result, Tensor};
use candle_nn::{Dropout, Linear, VarBuilder, linear};

/// Layer prefixes and `(out, in)` widths, input to output.
pub const LAYERS: [(&str, usize, usize); 4] = [
    ("fc1", 64, FEATURE_COUNT),
    ("fc2", 32, 64),
    ("fc3", 16, 32),
    ("out", 1, 16),
];

/// Every tensor the network expects, with its shape.
pub fn parameter_shapes() -> Vec<(String, Vec<usize>)> {
    LAYERS
        .iter()
        .flat_map(|(name, out, input)| {
            [
                (format!("{name}.weight"), vec![*out, *input]),
                (format!("{name}.bias"), vec![*out]),
            ]
        })
        .collect()
}

/// Feed-forward regressor: 7 → 64 → 32 → 16 → 1 with ReLU activations.
/// Dropout is applied after the first two hidden layers while training.
pub struct RatingNetwork {
    fc1: Linear,
    fc2: Linear,
    fc3: Linear,
    out: Linear,
    dropout: Dropout,
}

impl RatingNetwork {
    pub fn new(vb: VarBuilder, dropout: f32) -> Result<Self> {
        let [fc1, fc2, fc3, out] = LAYERS;
        Ok(Self {
            fc1: linear(fc1.2, fc1.1, vb.pp(fc1.0))?,
            fc2: linear(fc2.2, fc2.1, vb.pp(fc2.0))?,
            fc3: linear(fc3.2, fc3.1, vb.pp(fc3.0))?,
            out: linear(out.2, out.1, vb.pp(out.0))?,
            dropout: Dropout::new(dropout),
        })
    }

    /// Raw logits of shape `(batch, 1)`.
    pub fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let xs = self.fc1.forward(xs)?.relu()?;
        let xs = self.dropout.forward(&xs, train)?;
        let xs = self.fc2.forward(&xs)?.relu()?;
        let xs = self.dropout.forward(&xs, train)?;
        let xs = self.fc3.forward(&xs)?.relu()?;
        self.out.forward(&xs)
    }

    /// Probabilities in `[0, 1]`, shape `(batch, 1)`.
    pub fn predict(&self, xs: &Tensor) -> Result<Tensor> {
        candle_nn::ops::sigmoid(&self.forward_t(xs, false)?)
    }
}

/// Mean binary cross-entropy computed from logits.
///
/// Uses `max(x, 0) - x * t + ln(1 + e^-|x|)`, which stays finite for large
/// logits where `ln(sigmoid(x))` would underflow.
pub fn bce_with_logits(logits: &Tensor, targets: &Tensor) -> Result<Tensor> {
    let positive = logits.relu()?;
    let cross = logits.mul(targets)?;
    let softplus = logits.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
    positive.sub(&cross)?.add(&softplus)?.mean_all()
}
