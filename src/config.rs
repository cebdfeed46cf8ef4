use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::transfer::DEFAULT_TRANSFER_TTL_SECS;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Keep sqlx statement logs below `log_level`
    #[serde(default)]
    pub enable_tracing: bool,
    /// PostgreSQL connection URL
    pub postgres_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub settlement: SettlementConfig,
    #[serde(default)]
    pub expiry_sweep: ExpirySweepConfig,
}

fn default_max_connections() -> u32 {
    50
}

/// Settlement rules
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SettlementConfig {
    /// Seconds a sent transfer stays acceptable
    pub transfer_ttl_secs: u64,
    /// Maximum entries in an activity feed
    pub feed_limit: usize,
    /// Attempts at drawing an unused account number
    pub account_number_attempts: u32,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            transfer_ttl_secs: DEFAULT_TRANSFER_TTL_SECS,
            feed_limit: 10,
            account_number_attempts: 5,
        }
    }
}

/// Background expiry of overdue PENDING transfers
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ExpirySweepConfig {
    pub enabled: bool,
    pub scan_interval_secs: u64,
    pub batch_size: usize,
}

impl Default for ExpirySweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval_secs: 60,
            batch_size: 100,
        }
    }
}

impl ExpirySweepConfig {
    /// Pause between sweeps, never shorter than one second
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs.max(1))
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }
}
