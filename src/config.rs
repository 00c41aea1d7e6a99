//! Configuration.
//!
//! Supports YAML file and environment variable overrides. The earning
//! section is handed explicitly to every engine call; nothing here is
//! global mutable state.

use serde::Deserialize;
use std::path::Path;

use crate::engine::CustomerStatus;

/// Service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Earning configuration.
    pub earning: EarningConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type (sqlite or memory).
    #[serde(rename = "type")]
    pub storage_type: String,
    /// Path to database file.
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: "sqlite".to_string(),
            path: "./data/ledger.db".to_string(),
        }
    }
}

/// Which customers earn points, and which SKUs count as delivery cost.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EarningConfig {
    /// Customer statuses eligible to earn points.
    pub earning_statuses: Vec<CustomerStatus>,
    /// SKUs treated as delivery cost by rules that exclude it.
    pub delivery_skus: Vec<String>,
}

impl Default for EarningConfig {
    fn default() -> Self {
        Self {
            earning_statuses: vec![CustomerStatus::Active],
            delivery_skus: Vec::new(),
        }
    }
}

impl EarningConfig {
    pub fn can_earn(&self, status: CustomerStatus) -> bool {
        self.earning_statuses.contains(&status)
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Config file
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("TALLY_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            Self::from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("TALLY_STORAGE_PATH") {
            self.storage.path = path;
        }

        if let Ok(storage_type) = std::env::var("TALLY_STORAGE_TYPE") {
            self.storage.storage_type = storage_type;
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{0}': {1}")]
    FileRead(String, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.storage_type, "sqlite");
        assert_eq!(config.storage.path, "./data/ledger.db");
        assert_eq!(
            config.earning.earning_statuses,
            vec![CustomerStatus::Active]
        );
        assert!(config.earning.delivery_skus.is_empty());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
storage:
  type: memory
  path: /tmp/test.db

earning:
  earning_statuses:
    - active
    - new
  delivery_skus:
    - DELIVERY
    - SHIPPING
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.storage.storage_type, "memory");
        assert_eq!(config.storage.path, "/tmp/test.db");
        assert_eq!(config.earning.earning_statuses.len(), 2);
        assert!(config.earning.can_earn(CustomerStatus::New));
        assert!(!config.earning.can_earn(CustomerStatus::Blocked));
        assert_eq!(config.earning.delivery_skus.len(), 2);
    }
}
