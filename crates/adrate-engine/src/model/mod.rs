//! Rating model: a small feed-forward regressor over standardized feature
//! vectors, predicting a rating in `[0, 1]`.
//!
//! [`RatingModel`] publishes an immutable [`ModelState`] behind a shared
//! handle. Fitting and loading build a complete new state first and only then
//! swap it in, so a failed fit or load leaves the previous state untouched and
//! predictions never observe a half-updated model.

pub mod network;
pub mod scaler;
pub mod state;
pub mod trainer;

use crate::config::{ConfigError, TrainingConfig};
use crate::features::{FEATURE_COUNT, FeatureVector};
use crate::persistence::PersistenceError;
use adrate_common::Rating;
use chrono::Utc;
use scaler::StandardScaler;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;
use tracing::info;

pub use state::ModelState;
pub use trainer::{EpochMetrics, TrainingSummary};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Cannot fit a model on an empty corpus")]
    InsufficientData,

    #[error("Model has not been fitted or loaded")]
    NotFitted,

    #[error("Inconsistent model state: {0}")]
    InconsistentState(String),

    #[error("Feature {name} is not finite ({value})")]
    NonFiniteFeature { name: &'static str, value: f64 },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

pub(crate) fn check_finite(features: &FeatureVector) -> Result<(), ModelError> {
    match features.named().find(|(_, v)| !v.is_finite()) {
        Some((name, value)) => Err(ModelError::NonFiniteFeature { name, value }),
        None => Ok(()),
    }
}

pub struct RatingModel {
    config: TrainingConfig,
    current: RwLock<Option<Arc<ModelState>>>,
    // Serializes state transitions (fit commit, save, load).
    transition: Mutex<()>,
}

impl RatingModel {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            current: RwLock::new(None),
            transition: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// The currently published state, if any.
    pub fn state(&self) -> Option<Arc<ModelState>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_fitted(&self) -> bool {
        self.state().is_some()
    }

    fn publish(&self, state: ModelState) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(state));
    }

    /// Fit scaler and network on `examples` and publish the result.
    ///
    /// The scaler is always refit from scratch on the full corpus. With
    /// `warm_start`, the network starts from the published weights.
    pub fn fit(&self, examples: &[(FeatureVector, Rating)]) -> Result<TrainingSummary, ModelError> {
        if examples.is_empty() {
            return Err(ModelError::InsufficientData);
        }
        self.config.validate()?;

        let mut rows = Vec::with_capacity(examples.len());
        for (features, _) in examples {
            check_finite(features)?;
            rows.push(features.to_array());
        }
        let scaler = StandardScaler::fit(&rows).ok_or(ModelError::InsufficientData)?;

        let normalized: Vec<[f32; FEATURE_COUNT]> = rows
            .iter()
            .map(|row| {
                let mut out = [0f32; FEATURE_COUNT];
                for (o, v) in out.iter_mut().zip(scaler.transform(row)) {
                    *o = v as f32;
                }
                out
            })
            .collect();
        let labels: Vec<f32> = examples.iter().map(|(_, r)| r.value() as f32).collect();

        let previous = if self.config.warm_start {
            self.state()
        } else {
            None
        };
        let warm = previous.as_deref().map(ModelState::weights);

        info!(
            "Fitting rating model on {} examples ({} epochs, batch size {})",
            examples.len(),
            self.config.epochs,
            self.config.batch_size
        );
        let (weights, summary) = trainer::train(&normalized, &labels, &self.config, warm)?;
        let state = ModelState::from_parts(scaler, weights, examples.len(), Utc::now())?;

        let _guard = self.transition.lock().unwrap_or_else(PoisonError::into_inner);
        self.publish(state);
        info!("Rating model fitted: final loss {:?}", summary.final_loss());
        Ok(summary)
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<f64, ModelError> {
        self.state().ok_or(ModelError::NotFitted)?.predict(features)
    }

    pub fn predict_batch(&self, batch: &[FeatureVector]) -> Result<Vec<f64>, ModelError> {
        self.state().ok_or(ModelError::NotFitted)?.predict_batch(batch)
    }

    /// Persist the published state as one unit.
    pub fn save(&self, dir: &Path) -> Result<(), ModelError> {
        let _guard = self.transition.lock().unwrap_or_else(PoisonError::into_inner);
        let state = self.state().ok_or(ModelError::NotFitted)?;
        state.save(dir)?;
        Ok(())
    }

    /// Load and publish a saved state. `Ok(())` means both artifacts were read
    /// and agree with the current feature schema; on any error the previously
    /// published state (or its absence) is kept as is.
    pub fn load(&self, dir: &Path) -> Result<(), ModelError> {
        let _guard = self.transition.lock().unwrap_or_else(PoisonError::into_inner);
        let state = ModelState::load(dir)?;
        info!(
            "Loaded rating model from {} ({} training examples)",
            dir.display(),
            state.trained_examples()
        );
        self.publish(state);
        Ok(())
    }
}
