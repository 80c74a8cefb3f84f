//! Immutable fitted model state and its on-disk form.
//!
//! A saved state is a directory holding two artifacts that only make sense
//! together: `weights.safetensors` (network tensors) and `model.json` (format
//! version, feature schema, scaler statistics). Saves are staged in a sibling
//! directory and swapped into place.

use super::ModelError;
use super::network::{RatingNetwork, parameter_shapes};
use super::scaler::StandardScaler;
use crate::features::{FEATURE_COUNT, FEATURE_NAMES, FeatureVector};
use crate::persistence::{self, PersistenceError};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub const FORMAT_VERSION: u32 = 1;
pub const WEIGHTS_FILE: &str = "weights.safetensors";
pub const MANIFEST_FILE: &str = "model.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    feature_names: Vec<String>,
    width: usize,
    scaler: StandardScaler,
    trained_examples: usize,
    fitted_at: DateTime<Utc>,
}

pub struct ModelState {
    scaler: StandardScaler,
    weights: HashMap<String, Tensor>,
    network: RatingNetwork,
    trained_examples: usize,
    fitted_at: DateTime<Utc>,
}

impl ModelState {
    /// Assemble a state, checking that the scaler and every tensor match the
    /// current feature schema.
    pub(crate) fn from_parts(
        scaler: StandardScaler,
        weights: HashMap<String, Tensor>,
        trained_examples: usize,
        fitted_at: DateTime<Utc>,
    ) -> Result<Self, ModelError> {
        if scaler.width() != FEATURE_COUNT || scaler.scale.len() != FEATURE_COUNT {
            return Err(ModelError::InconsistentState(format!(
                "scaler width {} does not match feature width {}",
                scaler.width(),
                FEATURE_COUNT
            )));
        }

        for (name, shape) in parameter_shapes() {
            match weights.get(&name) {
                Some(tensor) if tensor.dims() == shape.as_slice() => {}
                Some(tensor) => {
                    return Err(ModelError::InconsistentState(format!(
                        "tensor {name} has shape {:?}, expected {:?}",
                        tensor.dims(),
                        shape
                    )));
                }
                None => {
                    return Err(ModelError::InconsistentState(format!(
                        "tensor {name} is missing"
                    )));
                }
            }
        }

        let vb = VarBuilder::from_tensors(weights.clone(), DType::F32, &Device::Cpu);
        let network = RatingNetwork::new(vb, 0.0)?;

        Ok(Self {
            scaler,
            weights,
            network,
            trained_examples,
            fitted_at,
        })
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn trained_examples(&self) -> usize {
        self.trained_examples
    }

    pub fn fitted_at(&self) -> DateTime<Utc> {
        self.fitted_at
    }

    pub(crate) fn weights(&self) -> &HashMap<String, Tensor> {
        &self.weights
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<f64, ModelError> {
        let mut out = self.predict_batch(std::slice::from_ref(features))?;
        out.pop()
            .ok_or_else(|| ModelError::InconsistentState("network returned no output".into()))
    }

    pub fn predict_batch(&self, batch: &[FeatureVector]) -> Result<Vec<f64>, ModelError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut flat = Vec::with_capacity(batch.len() * FEATURE_COUNT);
        for features in batch {
            super::check_finite(features)?;
            flat.extend(
                self.scaler
                    .transform(&features.to_array())
                    .into_iter()
                    .map(|v| v as f32),
            );
        }

        let xs = Tensor::from_vec(flat, (batch.len(), FEATURE_COUNT), &Device::Cpu)?;
        let probs = self.network.predict(&xs)?.flatten_all()?.to_vec1::<f32>()?;
        Ok(probs.into_iter().map(f64::from).collect())
    }

    /// Write both artifacts to `dir`, replacing any previous state there
    /// only once the new one is completely written.
    pub fn save(&self, dir: &Path) -> Result<(), PersistenceError> {
        let staging = persistence::sibling(dir, "staging")?;
        let previous = persistence::sibling(dir, "previous")?;

        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| PersistenceError::io(&staging, e))?;
        }
        fs::create_dir_all(&staging).map_err(|e| PersistenceError::io(&staging, e))?;

        let weights_path = staging.join(WEIGHTS_FILE);
        candle_core::safetensors::save(&self.weights, &weights_path).map_err(|e| {
            PersistenceError::Tensors {
                path: weights_path.clone(),
                message: e.to_string(),
            }
        })?;

        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            width: FEATURE_COUNT,
            scaler: self.scaler.clone(),
            trained_examples: self.trained_examples,
            fitted_at: self.fitted_at,
        };
        persistence::write_json_atomic(&staging.join(MANIFEST_FILE), &manifest)?;

        if previous.exists() {
            fs::remove_dir_all(&previous).map_err(|e| PersistenceError::io(&previous, e))?;
        }
        if dir.exists() {
            fs::rename(dir, &previous).map_err(|e| PersistenceError::io(dir, e))?;
        }
        if let Err(e) = fs::rename(&staging, dir) {
            if previous.exists() {
                if let Err(restore) = fs::rename(&previous, dir) {
                    return Err(PersistenceError::RestoreFailed {
                        path: dir.to_path_buf(),
                        previous,
                        source: e,
                        restore,
                    });
                }
            }
            return Err(PersistenceError::io(dir, e));
        }
        if previous.exists() {
            if let Err(e) = fs::remove_dir_all(&previous) {
                warn!("Failed to remove previous model state {}: {}", previous.display(), e);
            }
        }

        info!("Saved model state to {}", dir.display());
        Ok(())
    }

    /// Read a state written by [`ModelState::save`]. Nothing is published here;
    /// the caller decides whether to swap it in.
    ///
    /// When `dir` is missing but a save was interrupted after moving the old
    /// state aside, that state is read from `<dir>.previous` instead.
    pub fn load(dir: &Path) -> Result<Self, ModelError> {
        if !dir.exists() {
            let previous = persistence::sibling(dir, "previous")?;
            if previous.exists() {
                warn!(
                    "{} is missing, loading model state from {}",
                    dir.display(),
                    previous.display()
                );
                return Self::read_from(&previous);
            }
        }
        Self::read_from(dir)
    }

    fn read_from(dir: &Path) -> Result<Self, ModelError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest: Manifest = persistence::read_json(&manifest_path)?;

        if manifest.format_version != FORMAT_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                path: manifest_path,
                found: manifest.format_version,
                expected: FORMAT_VERSION,
            }
            .into());
        }
        if manifest.width != FEATURE_COUNT || manifest.feature_names != FEATURE_NAMES {
            return Err(ModelError::InconsistentState(format!(
                "saved feature schema {:?} (width {}) does not match {:?}",
                manifest.feature_names, manifest.width, FEATURE_NAMES
            )));
        }

        let weights_path = dir.join(WEIGHTS_FILE);
        let weights = candle_core::safetensors::load(&weights_path, &Device::Cpu).map_err(|e| {
            PersistenceError::Tensors {
                path: weights_path.clone(),
                message: e.to_string(),
            }
        })?;

        Self::from_parts(
            manifest.scaler,
            weights,
            manifest.trained_examples,
            manifest.fitted_at,
        )
    }
}
