//! Configuration management for the stakedrop indexer.
//!
//! This module handles loading configuration from:
//! - TOML files
//! - Environment variables (overrides TOML)
//! - Default values (fallbacks)

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Main configuration for the indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Network configuration
    pub network: NetworkConfig,

    /// Contract addresses
    pub contracts: ContractsConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Sync configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC URL
    pub rpc_url: String,

    /// Chain ID (e.g., 97 for BSC testnet)
    pub chain_id: u64,
}

/// Contract addresses configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsConfig {
    /// Staking contract (lock, referral, claim and funding events)
    pub staking: Address,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://stakedrop.db")
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Block to start from on a fresh store. When unset the indexer starts
    /// `cold_start_lookback` blocks behind the chain head.
    #[serde(default)]
    pub start_block: Option<u64>,

    /// Polling interval in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Maximum number of blocks fetched per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Blocks behind head used when no start block is configured
    #[serde(default = "default_cold_start_lookback")]
    pub cold_start_lookback: u64,

    /// Number of confirmations to wait before processing blocks
    #[serde(default)]
    pub confirmations: u64,

    /// Per-attempt RPC timeout in seconds
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,

    /// Attempts per RPC call
    #[serde(default = "default_rpc_max_retries")]
    pub rpc_max_retries: u32,

    /// Fixed delay between RPC attempts in milliseconds
    #[serde(default = "default_rpc_retry_backoff_ms")]
    pub rpc_retry_backoff_ms: u64,
}

impl SyncConfig {
    /// Polling interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Per-attempt RPC timeout as a duration.
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    /// Delay between RPC attempts as a duration.
    pub fn rpc_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.rpc_retry_backoff_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            start_block: None,
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
            cold_start_lookback: default_cold_start_lookback(),
            confirmations: 0,
            rpc_timeout_secs: default_rpc_timeout_secs(),
            rpc_max_retries: default_rpc_max_retries(),
            rpc_retry_backoff_ms: default_rpc_retry_backoff_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_batch_size() -> u64 {
    10_000
}

fn default_cold_start_lookback() -> u64 {
    1000
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

fn default_rpc_max_retries() -> u32 {
    3
}

fn default_rpc_retry_backoff_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides.
    ///
    /// Recognised overrides: `STAKEDROP_RPC_URL`, `STAKEDROP_CHAIN_ID`,
    /// `STAKEDROP_STAKING_CONTRACT`, `STAKEDROP_START_BLOCK`,
    /// `STAKEDROP_LOG_LEVEL`, `STAKEDROP_LOG_FORMAT` and `DATABASE_URL`.
    ///
    /// # Example
    /// ```no_run
    /// # use stakedrop_indexer::config::Config;
    /// let config = Config::from_file("indexer.toml")?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml).context("Failed to parse TOML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("STAKEDROP_RPC_URL") {
            self.network.rpc_url = url;
        }
        if let Some(chain_id) = lookup("STAKEDROP_CHAIN_ID") {
            self.network.chain_id = chain_id
                .parse()
                .with_context(|| format!("Invalid STAKEDROP_CHAIN_ID: {}", chain_id))?;
        }
        if let Some(staking) = lookup("STAKEDROP_STAKING_CONTRACT") {
            self.contracts.staking = Address::from_str(&staking)
                .with_context(|| format!("Invalid STAKEDROP_STAKING_CONTRACT: {}", staking))?;
        }
        if let Some(start_block) = lookup("STAKEDROP_START_BLOCK") {
            self.sync.start_block = Some(
                start_block
                    .parse()
                    .with_context(|| format!("Invalid STAKEDROP_START_BLOCK: {}", start_block))?,
            );
        }
        if let Some(level) = lookup("STAKEDROP_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("STAKEDROP_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }

        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.network.rpc_url.is_empty() {
            anyhow::bail!("Network RPC URL cannot be empty");
        }

        if self.network.chain_id == 0 {
            anyhow::bail!("Chain ID must be non-zero");
        }

        if self.contracts.staking.is_zero() {
            anyhow::bail!("Contracts staking must be a non-zero address");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be > 0");
        }
        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot exceed max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.sync.poll_interval_secs == 0 {
            anyhow::bail!("Sync poll_interval_secs must be > 0");
        }
        if self.sync.batch_size == 0 {
            anyhow::bail!("Sync batch_size must be > 0");
        }
        if self.sync.rpc_timeout_secs == 0 {
            anyhow::bail!("Sync rpc_timeout_secs must be > 0");
        }
        if self.sync.rpc_max_retries == 0 {
            anyhow::bail!("Sync rpc_max_retries must be > 0");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level '{}', must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            );
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log format '{}', must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            );
        }

        Ok(())
    }
}
