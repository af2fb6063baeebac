use super::schema::SidekickConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from default locations:
    /// 1. ./sidekick.yaml
    /// 2. ~/.sidekick/config.yaml
    /// 3. Default configuration
    pub async fn load_default() -> Result<SidekickConfig, ConfigError> {
        let local_config = PathBuf::from("./sidekick.yaml");
        if local_config.exists() {
            return Self::load_from(&local_config).await;
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".sidekick").join("config.yaml");
            if home_config.exists() {
                return Self::load_from(&home_config).await;
            }
        }

        Ok(SidekickConfig::default())
    }

    pub async fn load_from(path: &Path) -> Result<SidekickConfig, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        if content.trim().is_empty() {
            return Ok(SidekickConfig::default());
        }
        let config: SidekickConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}
