use super::network::{RatingNetwork, bce_with_logits};
use crate::config::TrainingConfig;
use crate::features::FEATURE_COUNT;
use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
}

/// Loss/accuracy trajectory of one fit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub train_examples: usize,
    pub validation_examples: usize,
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingSummary {
    pub fn final_metrics(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    pub fn initial_loss(&self) -> Option<f64> {
        self.epochs.first().map(|m| m.loss)
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.final_metrics().map(|m| m.loss)
    }
}

struct Dataset {
    inputs: Tensor,
    targets: Tensor,
    labels: Vec<f32>,
}

impl Dataset {
    fn new(
        rows: &[[f32; FEATURE_COUNT]],
        labels: &[f32],
        device: &Device,
    ) -> candle_core::Result<Self> {
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Ok(Self {
            inputs: Tensor::from_vec(flat, (rows.len(), FEATURE_COUNT), device)?,
            targets: Tensor::from_vec(labels.to_vec(), (labels.len(), 1), device)?,
            labels: labels.to_vec(),
        })
    }
}

/// Index where the validation tail starts. The tail is dropped entirely when
/// it would leave nothing to train on.
pub(crate) fn split_point(n: usize, validation_split: f64) -> usize {
    let split_at = (n as f64 * (1.0 - validation_split)).floor() as usize;
    if split_at == 0 { n } else { split_at.min(n) }
}

/// Fit a fresh network (optionally initialised from `warm_start`) on
/// already-normalized rows. Returns the trained weights and the trajectory.
pub(crate) fn train(
    rows: &[[f32; FEATURE_COUNT]],
    labels: &[f32],
    config: &TrainingConfig,
    warm_start: Option<&HashMap<String, Tensor>>,
) -> candle_core::Result<(HashMap<String, Tensor>, TrainingSummary)> {
    let device = Device::Cpu;
    let split_at = split_point(rows.len(), config.validation_split);
    let train_set = Dataset::new(&rows[..split_at], &labels[..split_at], &device)?;
    let val_set = if split_at < rows.len() {
        Some(Dataset::new(&rows[split_at..], &labels[split_at..], &device)?)
    } else {
        None
    };

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let network = RatingNetwork::new(vb, config.dropout)?;
    if let Some(weights) = warm_start {
        restore(&varmap, weights)?;
    }

    let params = ParamsAdamW {
        lr: config.learning_rate,
        weight_decay: 0.0,
        ..Default::default()
    };
    let mut optimizer = AdamW::new(varmap.all_vars(), params)?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut order: Vec<u32> = (0..split_at as u32).collect();

    let mut summary = TrainingSummary {
        train_examples: split_at,
        validation_examples: rows.len() - split_at,
        epochs: Vec::with_capacity(config.epochs),
    };

    for epoch in 1..=config.epochs {
        order.shuffle(&mut rng);

        let mut loss_sum = 0.0;
        for batch in order.chunks(config.batch_size) {
            let idx = Tensor::from_slice(batch, batch.len(), &device)?;
            let xs = train_set.inputs.index_select(&idx, 0)?;
            let ys = train_set.targets.index_select(&idx, 0)?;

            let loss = bce_with_logits(&network.forward_t(&xs, true)?, &ys)?;
            optimizer.backward_step(&loss)?;
            loss_sum += f64::from(loss.to_scalar::<f32>()?) * batch.len() as f64;
        }

        let (_, accuracy) = evaluate(&network, &train_set)?;
        let (val_loss, val_accuracy) = match &val_set {
            Some(set) => {
                let (loss, acc) = evaluate(&network, set)?;
                (Some(loss), Some(acc))
            }
            None => (None, None),
        };

        let metrics = EpochMetrics {
            epoch,
            loss: loss_sum / split_at as f64,
            accuracy,
            val_loss,
            val_accuracy,
        };
        debug!(
            epoch,
            loss = metrics.loss,
            accuracy = metrics.accuracy,
            val_loss = ?metrics.val_loss,
            "epoch complete"
        );
        summary.epochs.push(metrics);
    }

    Ok((snapshot(&varmap)?, summary))
}

fn evaluate(network: &RatingNetwork, set: &Dataset) -> candle_core::Result<(f64, f64)> {
    let logits = network.forward_t(&set.inputs, false)?;
    let loss = bce_with_logits(&logits, &set.targets)?.to_scalar::<f32>()?;
    let probs = candle_nn::ops::sigmoid(&logits)?
        .flatten_all()?
        .to_vec1::<f32>()?;

    let agree = probs
        .iter()
        .zip(&set.labels)
        .filter(|(p, t)| (**p > 0.5) == (**t > 0.5))
        .count();
    Ok((f64::from(loss), agree as f64 / set.labels.len() as f64))
}

fn restore(varmap: &VarMap, weights: &HashMap<String, Tensor>) -> candle_core::Result<()> {
    let vars = varmap
        .data()
        .lock()
        .map_err(|_| candle_core::Error::Msg("variable store lock poisoned".into()))?;
    for (name, var) in vars.iter() {
        if let Some(tensor) = weights.get(name) {
            var.set(tensor)?;
        }
    }
    Ok(())
}

fn snapshot(varmap: &VarMap) -> candle_core::Result<HashMap<String, Tensor>> {
    let vars = varmap
        .data()
        .lock()
        .map_err(|_| candle_core::Error::Msg("variable store lock poisoned".into()))?;
    vars.iter()
        .map(|(name, var)| Ok((name.clone(), detached(var.as_tensor())?)))
        .collect()
}

/// Copy of `tensor` with no link to the autograd graph or the source storage.
pub(crate) fn detached(tensor: &Tensor) -> candle_core::Result<Tensor> {
    let values = tensor.flatten_all()?.to_vec1::<f32>()?;
    Tensor::from_vec(values, tensor.dims(), tensor.device())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_point() {
        assert_eq!(split_point(10, 0.2), 8);
        assert_eq!(split_point(5, 0.2), 4);
        assert_eq!(split_point(1, 0.2), 1);
        assert_eq!(split_point(3, 0.0), 3);
    }
}
