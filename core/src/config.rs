//! Application configuration.
//!
//! Values come from built-in defaults, then `config.yaml` in the data
//! directory, then `WEALTH_TRACKER_*` environment variables.

use anyhow::{anyhow, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::storage::RetryPolicy;

pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const ENV_DATA_DIR: &str = "WEALTH_TRACKER_DATA_DIR";
pub const ENV_USER_ID: &str = "WEALTH_TRACKER_USER_ID";
pub const ENV_BIND: &str = "WEALTH_TRACKER_BIND";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Bearer token required by the table API when set
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_directory: PathBuf,
    pub user_id: String,
    pub remote: RemoteConfig,
    pub retry: RetryConfig,
    pub server: ServerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_directory: default_data_directory(),
            user_id: "local-user".to_string(),
            remote: RemoteConfig::default(),
            retry: RetryConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// `<platform data dir>/Wealth Tracker`, or `$HOME/Documents/Wealth Tracker`
pub fn default_data_directory() -> PathBuf {
    dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Documents")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Wealth Tracker")
}

impl AppConfig {
    /// Load configuration using the process environment
    pub fn load() -> Result<Self> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    /// Load configuration, reading environment variables through `env`
    pub fn load_with<F>(env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_directory = env(ENV_DATA_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(default_data_directory);

        let mut config = Self::from_directory(&data_directory)?;
        config.data_directory = data_directory;

        if let Some(user_id) = env(ENV_USER_ID) {
            config.user_id = user_id;
        }
        if let Some(bind_address) = env(ENV_BIND) {
            config.server.bind_address = bind_address;
        }

        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `config.yaml` from `directory`, if present
    pub fn from_directory(directory: &Path) -> Result<Self> {
        let path = directory.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: AppConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(anyhow!("user_id cannot be empty"));
        }
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be at least 1"));
        }
        if self.server.bind_address.trim().is_empty() {
            return Err(anyhow!("server.bind_address cannot be empty"));
        }
        Ok(())
    }

    /// Directory holding the local key-value store
    pub fn local_store_directory(&self) -> PathBuf {
        self.data_directory.join("local")
    }

    /// Snapshot file of the in-process remote tables
    pub fn remote_snapshot_path(&self) -> PathBuf {
        self.data_directory.join("remote").join("tables.json")
    }
}
