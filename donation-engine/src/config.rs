use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;

use crate::errors::{EngineError, Result};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub chain: ChainConfig,
    pub sequencer: SequencerConfig,
    pub reconciliation: ReconciliationConfig,
    pub contract: ContractConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// How long to wait for finality before treating the outcome as Unknown
    pub finality_deadline_ms: u64,
    /// Hex-encoded 32-byte seed for the administrative credential; a random
    /// credential is generated when unset (dev only)
    pub admin_key_seed: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// Bounded queue capacity; a full queue rejects immediately
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Cron schedule for the pending-record sweep
    pub sweep_schedule: String,
    /// Cron schedule for ending campaigns whose end time passed
    pub campaign_expiry_schedule: String,
    /// Seconds after which an unlocatable pending record is marked Failed
    pub pending_grace_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    pub min_native_donation: Decimal,
    pub withdrawal_cooldown_secs: i64,
    /// Accepted ERC20 token addresses
    pub accepted_tokens: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://givechain-mirror.db?mode=rwc".to_string(),
                max_connections: 5,
            },
            chain: ChainConfig {
                finality_deadline_ms: 30_000,
                admin_key_seed: None,
            },
            sequencer: SequencerConfig { capacity: 256 },
            reconciliation: ReconciliationConfig {
                // Every minute
                sweep_schedule: "0 * * * * *".to_string(),
                // Every five minutes
                campaign_expiry_schedule: "0 */5 * * * *".to_string(),
                pending_grace_secs: 3_600,
            },
            contract: ContractConfig {
                min_native_donation: Decimal::new(1, 4),
                withdrawal_cooldown_secs: 86_400,
                accepted_tokens: Vec::new(),
            },
        }
    }
}

impl Config {
    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| EngineError::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Load defaults and apply environment overrides
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Config::default();

        if let Ok(url) = env::var("DATABASE_URL") {
            config.database.url = url;
        }
        if let Ok(capacity) = env::var("SEQUENCER_CAPACITY") {
            config.sequencer.capacity = capacity
                .parse()
                .map_err(|e| EngineError::Configuration(format!("SEQUENCER_CAPACITY: {}", e)))?;
        }
        if let Ok(deadline) = env::var("FINALITY_DEADLINE_MS") {
            config.chain.finality_deadline_ms = deadline
                .parse()
                .map_err(|e| EngineError::Configuration(format!("FINALITY_DEADLINE_MS: {}", e)))?;
        }
        if let Ok(seed) = env::var("ADMIN_KEY_SEED") {
            config.chain.admin_key_seed = Some(seed);
        }
        if let Ok(grace) = env::var("PENDING_GRACE_SECS") {
            config.reconciliation.pending_grace_secs = grace
                .parse()
                .map_err(|e| EngineError::Configuration(format!("PENDING_GRACE_SECS: {}", e)))?;
        }

        Ok(config)
    }

    /// Decode the configured admin key seed, if set
    pub fn admin_seed_bytes(&self) -> Result<Option<[u8; 32]>> {
        match &self.chain.admin_key_seed {
            None => Ok(None),
            Some(seed_hex) => {
                let bytes = hex::decode(seed_hex.trim_start_matches("0x"))
                    .map_err(|e| EngineError::Configuration(format!("ADMIN_KEY_SEED: {}", e)))?;
                let seed: [u8; 32] = bytes.try_into().map_err(|_| {
                    EngineError::Configuration("ADMIN_KEY_SEED must be 32 bytes".to_string())
                })?;
                Ok(Some(seed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sequencer.capacity, 256);
        assert_eq!(config.contract.withdrawal_cooldown_secs, 86_400);
        assert!(config.chain.admin_key_seed.is_none());
    }

    #[test]
    fn test_admin_seed_decoding() {
        let mut config = Config::default();
        assert!(config.admin_seed_bytes().unwrap().is_none());

        config.chain.admin_key_seed = Some(format!("0x{}", "ab".repeat(32)));
        assert_eq!(config.admin_seed_bytes().unwrap(), Some([0xab; 32]));

        config.chain.admin_key_seed = Some("abcd".to_string());
        assert!(config.admin_seed_bytes().is_err());
    }
}
