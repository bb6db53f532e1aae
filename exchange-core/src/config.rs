//! Configuration for the exchange

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Exchange configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Fixed credit tariffs
    pub tariffs: TariffConfig,

    /// Lending rules
    pub lending: LendingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/exchange"),
            service_name: "exchange-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            rocksdb: RocksDBConfig::default(),
            tariffs: TariffConfig::default(),
            lending: LendingConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Sync the WAL on every commit
    pub sync_writes: bool,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 16,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            sync_writes: true,
            enable_statistics: false,
        }
    }
}

/// Credit tariffs, enforced by the callers of the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TariffConfig {
    /// Credits granted at signup
    pub signup_bonus: i64,

    /// Credits granted per listed book
    pub listing_reward: i64,

    /// Credits charged per borrow request
    pub borrow_cost: i64,
}

impl Default for TariffConfig {
    fn default() -> Self {
        Self {
            signup_bonus: 3,
            listing_reward: 1,
            borrow_cost: 1,
        }
    }
}

/// Who may confirm that a book came back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnConfirmation {
    /// Borrower or owner
    EitherParty,
    /// Owner only
    OwnerOnly,
    /// Borrower only
    BorrowerOnly,
}

impl std::str::FromStr for ReturnConfirmation {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "either_party" | "either" => Ok(ReturnConfirmation::EitherParty),
            "owner_only" | "owner" => Ok(ReturnConfirmation::OwnerOnly),
            "borrower_only" | "borrower" => Ok(ReturnConfirmation::BorrowerOnly),
            other => Err(crate::Error::Config(format!(
                "Unknown return confirmation policy: {}",
                other
            ))),
        }
    }
}

/// Lending configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LendingConfig {
    /// Return confirmation policy
    pub return_confirmation: ReturnConfirmation,
}

impl Default for LendingConfig {
    fn default() -> Self {
        Self {
            return_confirmation: ReturnConfirmation::EitherParty,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("EXCHANGE_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(policy) = std::env::var("EXCHANGE_RETURN_CONFIRMATION") {
            config.lending.return_confirmation = policy.parse()?;
        }

        if let Some(value) = env_credits("EXCHANGE_SIGNUP_BONUS")? {
            config.tariffs.signup_bonus = value;
        }

        if let Some(value) = env_credits("EXCHANGE_LISTING_REWARD")? {
            config.tariffs.listing_reward = value;
        }

        if let Some(value) = env_credits("EXCHANGE_BORROW_COST")? {
            config.tariffs.borrow_cost = value;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject tariffs the ledger would refuse to post
    pub fn validate(&self) -> crate::Result<()> {
        let tariffs = [
            ("signup_bonus", self.tariffs.signup_bonus),
            ("listing_reward", self.tariffs.listing_reward),
            ("borrow_cost", self.tariffs.borrow_cost),
        ];
        for (name, value) in tariffs {
            if value <= 0 {
                return Err(crate::Error::Config(format!(
                    "Tariff {} must be positive, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

fn env_credits(key: &str) -> crate::Result<Option<i64>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|e| crate::Error::Config(format!("{}: {}", key, e))),
        Err(_) => Ok(None),
    }
}
