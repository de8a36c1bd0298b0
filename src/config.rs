//! Configuration module
//!
//! Configuration is loaded from a TOML file; `.env` is read first so that
//! clap's `env` fallbacks see its values.

use serde::{Deserialize, Serialize};
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::submission::EngineConfig;
use crate::tx_builder::{
    chunk_with_empty_signers, plan, BatchError, InstructionUnit, SequencePolicy, TransportLimits,
    TypedInstructionBatch,
};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// RPC endpoint configuration
    pub rpc: RpcConfig,

    /// Wallet configuration
    pub wallet: WalletConfig,

    /// Batching and submission behaviour
    #[serde(default)]
    pub submission: SubmissionConfig,

    /// Governance target
    #[serde(default)]
    pub governance: GovernanceConfig,

    /// Monitoring and logging
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// JSON-RPC endpoint URL
    pub endpoint: String,

    /// Commitment level: processed, confirmed or finalized
    #[serde(default = "default_commitment")]
    pub commitment: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,

    /// Max retries for read-only requests
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Rate limit (requests per second)
    #[serde(default = "default_rate_limit")]
    pub rate_limit_rps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Path to keypair file
    pub keypair_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Instructions per batch for count-based chunking
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// How long to wait for confirmation of each sent batch
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,

    /// Interval between signature status polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Run a preflight simulation before sending
    #[serde(default = "default_true")]
    pub simulate_before_send: bool,

    /// Instruction ceiling per transaction
    #[serde(default = "default_max_instructions")]
    pub max_instructions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Governance program id
    #[serde(default = "default_governance_program")]
    pub program_id: String,

    /// Realm address
    #[serde(default)]
    pub realm: Option<String>,

    /// Governance account address
    #[serde(default)]
    pub governance: Option<String>,

    /// Mint whose token owner record creates proposals
    #[serde(default)]
    pub governing_token_mint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Collect Prometheus metrics for submissions
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Emit logs as JSON
    #[serde(default)]
    pub json_logs: bool,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

// Default value functions
fn default_commitment() -> String { "confirmed".to_string() }
fn default_rpc_timeout() -> u64 { 30 }
fn default_max_retries() -> u32 { 3 }
fn default_rate_limit() -> u32 { 20 }
fn default_chunk_size() -> usize { 10 }
fn default_confirm_timeout() -> u64 { 60 }
fn default_poll_interval() -> u64 { 500 }
fn default_max_instructions() -> usize { crate::tx_builder::DEFAULT_MAX_INSTRUCTIONS }
fn default_governance_program() -> String { "GovER5Lthms3bLBqWub97yVrMmEogzX7xNjdXpPPCVZw".to_string() }
fn default_true() -> bool { true }

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            confirm_timeout_secs: default_confirm_timeout(),
            poll_interval_ms: default_poll_interval(),
            simulate_before_send: default_true(),
            max_instructions: default_max_instructions(),
        }
    }
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            program_id: default_governance_program(),
            realm: None,
            governance: None,
            governing_token_mint: None,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: default_true(),
            json_logs: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig {
                endpoint: "https://api.devnet.solana.com".to_string(),
                commitment: default_commitment(),
                timeout_secs: default_rpc_timeout(),
                max_retries: default_max_retries(),
                rate_limit_rps: default_rate_limit(),
            },
            wallet: WalletConfig {
                keypair_path: "~/.config/solana/id.json".to_string(),
            },
            submission: SubmissionConfig::default(),
            governance: GovernanceConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("Failed to read config file {}: {}", path, e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration after reading `.env` into the environment
    pub fn from_file_with_env(path: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_file(path)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc.endpoint.trim().is_empty() {
            return Err(ConfigError::Validation("rpc.endpoint is empty".to_string()));
        }
        parse_commitment(&self.rpc.commitment)?;
        if self.submission.chunk_size == 0 {
            return Err(ConfigError::Validation(
                "submission.chunk_size must be >= 1".to_string(),
            ));
        }
        if self.submission.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "submission.poll_interval_ms must be > 0".to_string(),
            ));
        }
        if self.submission.max_instructions == 0 {
            return Err(ConfigError::Validation(
                "submission.max_instructions must be >= 1".to_string(),
            ));
        }

        parse_pubkey("governance.program_id", &self.governance.program_id)?;
        for (field, value) in [
            ("governance.realm", &self.governance.realm),
            ("governance.governance", &self.governance.governance),
            ("governance.governing_token_mint", &self.governance.governing_token_mint),
        ] {
            if let Some(value) = value {
                parse_pubkey(field, value)?;
            }
        }
        Ok(())
    }

    /// Chunk a flat instruction list by `submission.chunk_size` and tag it
    ///
    /// Only the fee payer signs the resulting batches; this is the bulk path
    /// (e.g. minting to many recipients).
    pub fn bulk_schedule(
        &self,
        instructions: &[InstructionUnit],
        policy: SequencePolicy,
    ) -> Result<Vec<TypedInstructionBatch>, BatchError> {
        let batches = chunk_with_empty_signers(instructions, self.submission.chunk_size)?;
        Ok(plan(batches, policy))
    }

    /// Engine settings derived from the submission section
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            confirm_timeout: Duration::from_secs(self.submission.confirm_timeout_secs),
            poll_interval: Duration::from_millis(self.submission.poll_interval_ms),
            simulate_before_send: self.submission.simulate_before_send,
            limits: TransportLimits {
                max_instructions: self.submission.max_instructions,
                ..TransportLimits::default()
            },
        }
    }
}

/// Parse a commitment level name
pub fn parse_commitment(value: &str) -> Result<CommitmentConfig, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "processed" => Ok(CommitmentConfig::processed()),
        "confirmed" => Ok(CommitmentConfig::confirmed()),
        "finalized" => Ok(CommitmentConfig::finalized()),
        other => Err(ConfigError::Validation(format!(
            "unknown commitment level: {}",
            other
        ))),
    }
}

/// Parse a base58 public key, naming the field on failure
pub fn parse_pubkey(field: &str, value: &str) -> Result<Pubkey, ConfigError> {
    Pubkey::from_str(value)
        .map_err(|e| ConfigError::Validation(format!("{} is not a valid pubkey: {}", field, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
        [rpc]
        endpoint = "http://127.0.0.1:8899"

        [wallet]
        keypair_path = "/tmp/id.json"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.rpc.commitment, "confirmed");
        assert_eq!(config.submission.chunk_size, 10);
        assert!(config.submission.simulate_before_send);
        assert_eq!(
            config.governance.program_id,
            "GovER5Lthms3bLBqWub97yVrMmEogzX7xNjdXpPPCVZw"
        );
        assert!(config.monitoring.enable_metrics);
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let mut config = Config::default();
        config.submission.chunk_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_bad_pubkey() {
        let mut config = Config::default();
        config.governance.realm = Some("not-a-key".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("governance.realm"));
    }

    #[test]
    fn test_validate_rejects_unknown_commitment() {
        let mut config = Config::default();
        config.rpc.commitment = "max".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.rpc.endpoint, "http://127.0.0.1:8899");
    }

    #[test]
    fn test_bulk_schedule_uses_chunk_size() {
        let mut config = Config::default();
        config.submission.chunk_size = 10;
        let payer = Pubkey::new_unique();
        let units: Vec<InstructionUnit> = (0..23)
            .map(|_| {
                solana_sdk::system_instruction::transfer(&payer, &Pubkey::new_unique(), 1).into()
            })
            .collect();

        let schedule = config.bulk_schedule(&units, SequencePolicy::Sequential).unwrap();
        let sizes: Vec<usize> = schedule.iter().map(|t| t.batch().len()).collect();
        assert_eq!(sizes, vec![10, 10, 3]);
        assert!(schedule
            .iter()
            .all(|t| t.policy() == SequencePolicy::Sequential && t.batch().signers().is_empty()));

        config.submission.chunk_size = 4;
        assert_eq!(config.bulk_schedule(&units, SequencePolicy::Parallel).unwrap().len(), 6);
    }

    #[test]
    fn test_engine_config_mapping() {
        let mut config = Config::default();
        config.submission.confirm_timeout_secs = 5;
        config.submission.poll_interval_ms = 250;
        config.submission.max_instructions = 12;

        let engine = config.engine_config();
        assert_eq!(engine.confirm_timeout, Duration::from_secs(5));
        assert_eq!(engine.poll_interval, Duration::from_millis(250));
        assert_eq!(engine.limits.max_instructions, 12);
        assert_eq!(engine.limits.max_transaction_bytes, 1232);
    }
}
