//! Central configuration.
//!
//! Deserializes `config.toml` into a strongly-typed `Config`, falling back to
//! sensible defaults for every parameter so the binary can run with a minimal
//! or missing file. `validate()` gates startup on the values that have no
//! sane recovery at runtime.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use solana_sdk::commitment_config::CommitmentConfig;

use crate::types::TipTier;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to a JSON keypair file (fee payer and bundle signer).
    #[serde(default)]
    pub keypair_path: String,

    /// Ledger RPC endpoints, rotated on blockhash fetch failure.
    #[serde(default = "default_rpc_endpoints")]
    pub rpc_endpoints: Vec<String>,

    /// Jito block-engine JSON-RPC endpoint.
    #[serde(default = "default_block_engine_url")]
    pub block_engine_url: String,

    /// Tip-floor feed endpoint.
    #[serde(default = "default_tip_feed_url")]
    pub tip_feed_url: String,

    /// Tip-floor percentile to pay.
    #[serde(default)]
    pub tip_tier: TipTier,

    /// Retries after the first failed submission attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for the linear inter-attempt backoff.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Commitment level for anchor fetch and confirmation:
    /// "processed", "confirmed" or "finalized".
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keypair_path: String::new(),
            rpc_endpoints: default_rpc_endpoints(),
            block_engine_url: default_block_engine_url(),
            tip_feed_url: default_tip_feed_url(),
            tip_tier: TipTier::default(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            commitment: default_commitment(),
        }
    }
}

impl Config {
    /// Loads configuration from `config.toml`.
    /// If the file doesn't exist or fails to parse, returns the defaults.
    pub fn load() -> Self {
        Self::load_from(Path::new("config.toml"))
    }

    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Failed to parse {}: {}. Using default values.", path.display(), e);
                    Config::default()
                }
            },
            Err(_) => {
                warn!("{} not found. Using default values.", path.display());
                Config::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_endpoints.is_empty() {
            return Err(ConfigError::Validation(
                "rpc_endpoints must contain at least one endpoint".to_string(),
            ));
        }
        if self.block_engine_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "block_engine_url must not be empty".to_string(),
            ));
        }
        if self.tip_feed_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "tip_feed_url must not be empty".to_string(),
            ));
        }
        if self.backoff_base_ms == 0 {
            return Err(ConfigError::Validation(
                "backoff_base_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn commitment(&self) -> CommitmentConfig {
        match self.commitment.as_str() {
            "processed" => CommitmentConfig::processed(),
            "finalized" => CommitmentConfig::finalized(),
            _ => CommitmentConfig::confirmed(),
        }
    }
}

// --- Default value functions for serde ---

fn default_rpc_endpoints() -> Vec<String> {
    vec!["https://api.mainnet-beta.solana.com".to_string()]
}
fn default_block_engine_url() -> String {
    "https://mainnet.block-engine.jito.wtf/api/v1/bundles".to_string()
}
fn default_tip_feed_url() -> String {
    "https://bundles.jito.wtf/api/v1/bundles/tip_floor".to_string()
}
fn default_max_retries() -> u32 {
    2
}
fn default_backoff_base_ms() -> u64 {
    1_000
}
fn default_commitment() -> String {
    "confirmed".to_string()
}
