//! govflow: governance proposal assembly and transaction batch submission
//!
//! Instruction lists are chunked into transaction-sized batches
//! ([`tx_builder`]), tagged with a sequencing policy, and driven through
//! build → sign → send → confirm by the [`submission`] engine. The
//! [`governance`] module assembles the instruction list of a proposal.

pub mod config;
pub mod governance;
pub mod metrics;
pub mod observability;
pub mod rpc_manager;
pub mod structured_logging;
pub mod submission;
pub mod test_utils;
pub mod tx_builder;
pub mod wallet;

// Re-export commonly used types
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};
pub use submission::{BatchOutcome, SubmissionEngine, SubmissionError, SubmissionReport};
pub use tx_builder::{InstructionBatch, InstructionUnit, SequencePolicy, SignerSet};
