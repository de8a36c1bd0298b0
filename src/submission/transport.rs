//! Network boundary of the submission engine
//!
//! Four operations, nothing else: fetch a checkpoint, simulate, send, and read
//! a signature's status. Wire encoding lives behind the implementation.

use async_trait::async_trait;
use solana_sdk::{hash::Hash, signature::Signature, transaction::VersionedTransaction};

use crate::rpc_manager::TransportError;

/// Result of a preflight simulation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SimulationReport {
    /// Error the transaction would fail with, `None` when it would succeed
    pub err: Option<String>,
    /// Program logs
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

impl SimulationReport {
    pub fn succeeded(&self) -> bool {
        self.err.is_none()
    }
}

/// Observed on-chain status of a sent transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureState {
    /// Seen by the cluster but not yet at the target commitment
    Processing,
    /// Reached the target commitment without error
    Confirmed,
    /// Landed and failed
    Failed { code: Option<u32>, detail: String },
}

/// A chain endpoint the engine can submit to
#[async_trait]
pub trait ChainTransport: Send + Sync {
    /// Fetch a recent checkpoint (blockhash) for a new envelope
    async fn latest_checkpoint(&self) -> Result<Hash, TransportError>;

    /// Run a preflight simulation of a signed transaction
    async fn simulate(&self, tx: &VersionedTransaction) -> Result<SimulationReport, TransportError>;

    /// Submit a signed transaction, returning its signature
    async fn send_raw(&self, tx: &VersionedTransaction) -> Result<Signature, TransportError>;

    /// Look up a signature; `None` when the cluster has not seen it
    async fn signature_state(&self, signature: &Signature)
        -> Result<Option<SignatureState>, TransportError>;
}
