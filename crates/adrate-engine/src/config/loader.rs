use super::schema::AdrateConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from default locations:
    /// 1. ./adrate.yaml
    /// 2. ~/.adrate/config.yaml
    /// 3. Default configuration
    pub async fn load_default() -> Result<AdrateConfig, ConfigError> {
        let local_config = PathBuf::from("./adrate.yaml");
        if local_config.exists() {
            return Self::load_from(&local_config).await;
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".adrate").join("config.yaml");
            if home_config.exists() {
                return Self::load_from(&home_config).await;
            }
        }

        Ok(AdrateConfig::default())
    }

    pub async fn load_from(path: &Path) -> Result<AdrateConfig, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        // An empty document means "all defaults".
        if content.trim().is_empty() {
            return Ok(AdrateConfig::default());
        }
        let config: AdrateConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}
