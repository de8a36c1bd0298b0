//! Error taxonomy for batch submission
//!
//! Every terminal failure of a batch is recorded as one of these kinds. The
//! engine never swallows them; they end up in the batch's `Failed` outcome.

use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::time::Duration;
use thiserror::Error;

use crate::rpc_manager::TransportError;

/// Why a batch could not be signed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningFailure {
    /// The message requires a signature from a key the batch does not carry
    #[error("required signer {0} is absent from the batch signer set")]
    MissingSigner(Pubkey),

    /// The wallet refused or cancelled the signing request
    #[error("wallet rejected signing: {0}")]
    Rejected(String),

    /// The wallet's key is not the key the envelope was built for
    #[error("wallet key {wallet} does not match fee payer {fee_payer}")]
    PayerMismatch {
        /// Key reported by the wallet
        wallet: Pubkey,
        /// Fee payer compiled into the message
        fee_payer: Pubkey,
    },
}

/// Terminal failure of a single batch
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubmissionError {
    /// Oversized or malformed batch; the batch builder under-chunked
    #[error("Build error: {0}")]
    Build(String),

    /// Missing signer or user rejection
    #[error("Signing error: {0}")]
    Signing(#[from] SigningFailure),

    /// Transient transport or network fault
    #[error("Submit error: {0}")]
    Submit(String),

    /// Preflight simulation says the transaction would fail on-chain
    #[error("Simulation rejected: {reason}")]
    SimulationRejected {
        /// Error reported by the simulator
        reason: String,
        /// Program logs captured during simulation
        logs: Vec<String>,
    },

    /// Confirmation was not observed in time; the transaction may still land
    #[error("Confirmation timeout after {waited:?} (signature {signature})")]
    Timeout {
        /// Signature of the transaction that was sent
        signature: Signature,
        /// How long the engine waited
        waited: Duration,
    },

    /// The network reported the transaction failed on-chain
    #[error("Chain error (code={code:?}): {detail}")]
    Chain {
        /// Program-specific error code when the failure carries one
        code: Option<u32>,
        /// Verbatim error as reported by the network
        detail: String,
    },
}

impl SubmissionError {
    /// Check if this error is retryable as-is (with a fresh checkpoint)
    ///
    /// Timeouts are not: the caller must re-query chain state first.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Submit(_) => true,

            Self::Build(_) => false,
            Self::Signing(_) => false,
            Self::SimulationRejected { .. } => false,
            Self::Timeout { .. } => false,
            Self::Chain { .. } => false,
        }
    }

    /// Outcome is ambiguous and chain state must be checked before any retry
    pub fn requires_chain_requery(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::Build(_) => "build",
            Self::Signing(_) => "signing",
            Self::Submit(_) => "submit",
            Self::SimulationRejected { .. } => "simulation",
            Self::Timeout { .. } => "timeout",
            Self::Chain { .. } => "chain",
        }
    }
}

// Convenience constructors for common error scenarios
impl SubmissionError {
    /// Envelope exceeds the transport size limit
    pub fn oversized(size: usize, limit: usize) -> Self {
        Self::Build(format!(
            "transaction encodes to {} bytes, limit is {}",
            size, limit
        ))
    }

    /// Batch carries more instructions than the transport allows
    pub fn too_many_instructions(count: usize, limit: usize) -> Self {
        Self::Build(format!(
            "batch has {} instructions, limit is {}",
            count, limit
        ))
    }

    pub fn empty_batch() -> Self {
        Self::Build("batch has no instructions".to_string())
    }

    pub fn missing_signer(pubkey: Pubkey) -> Self {
        Self::Signing(SigningFailure::MissingSigner(pubkey))
    }

    pub fn chain(code: Option<u32>, detail: impl Into<String>) -> Self {
        Self::Chain {
            code,
            detail: detail.into(),
        }
    }
}

impl From<TransportError> for SubmissionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::PreflightRejected { message, logs, .. } => Self::SimulationRejected {
                reason: message,
                logs,
            },
            other => Self::Submit(other.to_string()),
        }
    }
}
