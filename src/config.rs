//! Configuration management for govchain

use crate::error::ChainError;
use crate::mempool::DEFAULT_MAX_MEMPOOL_SIZE;
use crate::miner;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub chain: ChainConfig,
    pub governance: GovernanceConfig,
    pub node: NodeConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub difficulty: u32,
    pub mining_reward: u64,
    pub genesis_address: String,
    pub genesis_supply: u64,
    pub token_symbol: String,
    pub token_name: String,
    pub max_mempool_size: usize,
    /// Reject transfers the sender cannot cover at submission time.
    pub enforce_balance: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: 2,
            mining_reward: 50,
            genesis_address: "GENESIS".to_string(),
            genesis_supply: 1_000_000,
            token_symbol: "GOV".to_string(),
            token_name: "Governance Token".to_string(),
            max_mempool_size: DEFAULT_MAX_MEMPOOL_SIZE,
            enforce_balance: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub required_approvals: usize,
    #[serde(deserialize_with = "deserialize_duration")]
    pub reversal_window: Duration,
    pub minimum_stake: u64,
    pub proposal_fee: u64,
    #[serde(deserialize_with = "deserialize_duration")]
    pub default_voting_period: Duration,
    pub report_reward: u64,
    pub false_report_penalty: u64,
    pub community_vote_min_balance: u64,
    pub treasury_address: String,
    /// Registered as both moderators and reversal approvers at startup.
    pub authorities: Vec<String>,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            required_approvals: 3,
            reversal_window: Duration::from_secs(24 * 60 * 60),
            minimum_stake: 100,
            proposal_fee: 10,
            default_voting_period: Duration::from_secs(7 * 24 * 60 * 60),
            report_reward: 25,
            false_report_penalty: 10,
            community_vote_min_balance: 50,
            treasury_address: "GOVERNANCE_TREASURY".to_string(),
            authorities: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Miner,
    Validator,
}

impl std::str::FromStr for NodeRole {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "miner" => Ok(NodeRole::Miner),
            "validator" => Ok(NodeRole::Validator),
            other => Err(ChainError::ConfigError(format!(
                "Unknown node role '{}', expected 'miner' or 'validator'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub role: NodeRole,
    pub miner_address: String,
    #[serde(deserialize_with = "deserialize_duration")]
    pub auto_mine_interval: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub auto_save_interval: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub validate_interval: Duration,
    pub rpc_port: u16,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            role: NodeRole::Miner,
            miner_address: "MINER".to_string(),
            auto_mine_interval: Duration::from_secs(15),
            auto_save_interval: Duration::from_secs(30),
            validate_interval: Duration::from_secs(30),
            rpc_port: 8545,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_data_path(),
        }
    }
}

fn default_data_path() -> String {
    "./data/govchain.db".to_string()
}

/// Accepts `"24h"`, `"7d"`, `"15s"` and the like.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

impl Config {
    pub fn from_toml(config_str: &str) -> Result<Self, ChainError> {
        let config: Config = toml::from_str(config_str)
            .map_err(|e| ChainError::ConfigError(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    // Validate critical values
    pub fn validate(&self) -> Result<(), ChainError> {
        miner::validate_difficulty(self.chain.difficulty)
            .map_err(|e| ChainError::ConfigError(e.to_string()))?;

        if self.database.path.is_empty() {
            return Err(ChainError::ConfigError(
                "database.path must be set in config.toml".to_string(),
            ));
        }
        if self.chain.genesis_address.is_empty() {
            return Err(ChainError::ConfigError(
                "chain.genesis_address must be set in config.toml".to_string(),
            ));
        }
        if self.chain.max_mempool_size == 0 {
            return Err(ChainError::ConfigError(
                "chain.max_mempool_size must be positive".to_string(),
            ));
        }
        if self.governance.required_approvals == 0 {
            return Err(ChainError::ConfigError(
                "governance.required_approvals must be at least 1".to_string(),
            ));
        }
        if self.governance.minimum_stake == 0 {
            return Err(ChainError::ConfigError(
                "governance.minimum_stake must be positive".to_string(),
            ));
        }
        if self.governance.treasury_address.is_empty() {
            return Err(ChainError::ConfigError(
                "governance.treasury_address must be set in config.toml".to_string(),
            ));
        }
        if self.node.role == NodeRole::Miner && self.node.miner_address.is_empty() {
            return Err(ChainError::ConfigError(
                "node.miner_address must be set for miner nodes".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reads `path`, providing sane defaults when the file is absent.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ChainError> {
    let config_str = match fs::read_to_string(path.as_ref()) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(ChainError::ConfigError(format!(
                "Failed to read {}: {}",
                path.as_ref().display(),
                e
            )))
        }
    };
    Config::from_toml(&config_str)
}
