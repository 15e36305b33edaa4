use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::Granularity;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub eligibility: EligibilityConfig,
    pub order_history: OrderHistoryConfig,
    pub stats: StatsConfig,
    pub moderation: ModerationConfig,
}

/// Which ledger implementation backs the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Document path for the JSON backend
    pub path: PathBuf,
    /// Falls back to `DATABASE_URL`
    pub database_url: Option<String>,
    pub io_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Json,
            path: PathBuf::from(".reviews/reviews.json"),
            database_url: None,
            io_timeout_ms: 5_000,
        }
    }
}

impl StorageConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn database_url(&self) -> Option<String> {
        self.database_url
            .clone()
            .or_else(|| std::env::var("DATABASE_URL").ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilityConfig {
    pub granularity: Granularity,
    pub provider_timeout_ms: u64,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            granularity: Granularity::PerOrder,
            provider_timeout_ms: 3_000,
        }
    }
}

impl EligibilityConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}

/// Where purchase records come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderHistorySource {
    #[default]
    File,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderHistoryConfig {
    pub source: OrderHistorySource,
    /// YAML or JSON list of orders for the file source
    pub path: PathBuf,
    pub base_url: Option<String>,
    /// Environment variable holding the bearer token for the HTTP source
    pub token_env: String,
}

impl Default for OrderHistoryConfig {
    fn default() -> Self {
        Self {
            source: OrderHistorySource::File,
            path: PathBuf::from(".reviews/orders.yml"),
            base_url: None,
            token_env: "ORDER_HISTORY_TOKEN".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub recent_window_days: u32,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            recent_window_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    pub admin_token_env: String,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            admin_token_env: "REVIEWS_ADMIN_TOKEN".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        info!(path = %path.display(), "Loaded configuration");

        Ok(config)
    }

    /// Load configuration from the default location (.reviews/config.yml)
    pub fn load_default() -> Result<Self> {
        Self::load(".reviews/config.yml")
    }
}
