//! Assembly-time failures
//!
//! Nothing has been submitted when any of these is raised, so every one of
//! them is recoverable by resolving again from scratch.

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::governance::pipeline::PipelineStep;
use crate::rpc_manager::TransportError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Realm {0} not found")]
    RealmNotFound(Pubkey),

    #[error("Governance {0} not found")]
    GovernanceNotFound(Pubkey),

    #[error("No token owner record for owner {owner} and mint {mint}")]
    TokenOwnerRecordNotFound { owner: Pubkey, mint: Pubkey },

    /// Account exists but is not what the pipeline expects
    #[error("Account {address} is invalid: {reason}")]
    InvalidAccount { address: Pubkey, reason: String },

    #[error("Mint {mint} is neither the community nor the council mint of realm {realm}")]
    MintNotGoverned { mint: Pubkey, realm: Pubkey },

    #[error("Step {step} cannot follow {after}")]
    OutOfOrder { step: PipelineStep, after: String },

    #[error("Pipeline is incomplete: {0}")]
    Incomplete(String),

    #[error("Insert transaction requires at least one payload instruction")]
    EmptyPayload,

    #[error("Hold-up time {requested}s is below the governance minimum of {minimum}s")]
    HoldUpTooShort { requested: u32, minimum: u32 },

    #[error("Treasury account {address} holds {available}, transfer needs {required}")]
    InsufficientTreasuryBalance {
        address: Pubkey,
        available: u64,
        required: u64,
    },

    #[error("Instruction encoding failed: {0}")]
    Encoding(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl PipelineError {
    /// Only transport faults during resolution are worth retrying unchanged
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_retryable(),
            _ => false,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::RealmNotFound(_)
            | Self::GovernanceNotFound(_)
            | Self::TokenOwnerRecordNotFound { .. } => "not_found",
            Self::InvalidAccount { .. } | Self::MintNotGoverned { .. } => "invalid_account",
            Self::OutOfOrder { .. } | Self::Incomplete(_) => "ordering",
            Self::EmptyPayload | Self::HoldUpTooShort { .. } => "invalid_request",
            Self::InsufficientTreasuryBalance { .. } => "balance",
            Self::Encoding(_) => "encoding",
            Self::Transport(_) => "transport",
        }
    }
}
