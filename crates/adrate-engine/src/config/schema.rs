use super::loader::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdrateConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
}

impl AdrateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.training.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_training_data_dir")]
    pub training_data_dir: PathBuf,
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            training_data_dir: default_training_data_dir(),
            model_dir: default_model_dir(),
            log_dir: default_log_dir(),
        }
    }
}

fn default_training_data_dir() -> PathBuf {
    PathBuf::from("training_data")
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_validation_split")]
    pub validation_split: f64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_dropout")]
    pub dropout: f32,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_warm_start")]
    pub warm_start: bool,
    /// Fit the model every time a rated sequence is committed.
    #[serde(default)]
    pub auto_train: bool,
    /// Rating applied when the operator skips to the next sequence without
    /// rating it. `None` discards the skipped sequence instead.
    #[serde(default = "default_next_rating")]
    pub next_rating: Option<f64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            validation_split: default_validation_split(),
            learning_rate: default_learning_rate(),
            dropout: default_dropout(),
            seed: default_seed(),
            warm_start: default_warm_start(),
            auto_train: false,
            next_rating: default_next_rating(),
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.epochs == 0 {
            return Err(ConfigError::Invalid("training.epochs must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "training.batch_size must be at least 1".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(ConfigError::Invalid(format!(
                "training.validation_split must be in [0, 1), got {}",
                self.validation_split
            )));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "training.learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ConfigError::Invalid(format!(
                "training.dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        match self.next_rating {
            Some(rating) if !(0.0..=1.0).contains(&rating) => Err(ConfigError::Invalid(format!(
                "training.next_rating must be in [0, 1], got {}",
                rating
            ))),
            _ => Ok(()),
        }
    }
}

fn default_epochs() -> usize {
    50
}

fn default_batch_size() -> usize {
    32
}

fn default_validation_split() -> f64 {
    0.2
}

fn default_learning_rate() -> f64 {
    1e-3
}

fn default_dropout() -> f32 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_warm_start() -> bool {
    true
}

fn default_next_rating() -> Option<f64> {
    Some(0.0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_driver_url")]
    pub driver_url: String,
    #[serde(default)]
    pub user_data_dir: Option<PathBuf>,
    #[serde(default = "default_profile_directory")]
    pub profile_directory: String,
    #[serde(default)]
    pub headless: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            driver_url: default_driver_url(),
            user_data_dir: None,
            profile_directory: default_profile_directory(),
            headless: false,
        }
    }
}

fn default_driver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_profile_directory() -> String {
    "Default".to_string()
}
