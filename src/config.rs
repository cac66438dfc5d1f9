//! Configuration management for AuditLedger

use crate::blockchain::{LedgerSettings, DEFAULT_MAX_TRANSACTIONS_PER_BLOCK, GENESIS_CREATOR};
use crate::error::{ChainError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// SQLite file, or `":memory:"`.
    #[serde(default = "default_storage_path")]
    pub path: String,
    /// JSON file holding the pending pool between CLI invocations.
    #[serde(default = "default_pending_path")]
    pub pending_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: default_storage_path(), pending_path: default_pending_path() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_creator_wallet")]
    pub creator_wallet: String,
    #[serde(default = "default_max_transactions_per_block")]
    pub max_transactions_per_block: usize,
    #[serde(default = "default_max_clock_skew_secs")]
    pub max_clock_skew_secs: u64,
    #[serde(default)]
    pub enriched_genesis: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            creator_wallet: default_creator_wallet(),
            max_transactions_per_block: default_max_transactions_per_block(),
            max_clock_skew_secs: default_max_clock_skew_secs(),
            enriched_genesis: false,
        }
    }
}

impl LedgerConfig {
    pub fn settings(&self) -> LedgerSettings {
        LedgerSettings {
            creator_wallet: self.creator_wallet.clone(),
            max_transactions_per_block: self.max_transactions_per_block,
            max_clock_skew_ms: self.max_clock_skew_secs.saturating_mul(1000),
            enriched_genesis: self.enriched_genesis,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

fn default_storage_path() -> String {
    "./data/ledger.db".to_string()
}

fn default_pending_path() -> String {
    "./data/pending.json".to_string()
}

fn default_creator_wallet() -> String {
    GENESIS_CREATOR.to_string()
}

fn default_max_transactions_per_block() -> usize {
    DEFAULT_MAX_TRANSACTIONS_PER_BLOCK
}

fn default_max_clock_skew_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load `config.toml` from the working directory.
pub fn load_config() -> Result<Config> {
    load_config_from(DEFAULT_CONFIG_PATH)
}

/// A missing or empty file yields the defaults.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<Config> {
    let config_str = fs::read_to_string(path).unwrap_or_default();
    let config = parse_config(&config_str)?;
    Ok(config)
}

pub fn parse_config(config_str: &str) -> Result<Config> {
    let config: Config = if config_str.trim().is_empty() {
        Config::default()
    } else {
        toml::from_str(config_str)?
    };

    // Validate critical values
    if config.storage.path.is_empty() {
        return Err(ChainError::Config("storage.path must be set in config.toml".into()));
    }
    if config.ledger.max_transactions_per_block == 0 {
        return Err(ChainError::Config(
            "ledger.max_transactions_per_block must be greater than zero".into(),
        ));
    }
    if config.ledger.creator_wallet.is_empty() {
        return Err(ChainError::Config("ledger.creator_wallet must be set in config.toml".into()));
    }

    Ok(config)
}
