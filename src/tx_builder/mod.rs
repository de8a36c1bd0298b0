//! Batch assembly: instruction units, chunking, sequencing and envelopes
//!
//! ## Architecture
//!
//! - **instructions**: `InstructionUnit`, `SignerSet`, `InstructionBatch`
//! - **chunk**: the batch builder (count-based chunks, size-aware packing,
//!   signer pairing)
//! - **plan**: the sequence planner (`SequencePolicy`, typed batches, phases)
//! - **envelope**: compile + size check + signing of one batch
//! - **errors**: `BatchError`
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use govflow::tx_builder::{chunk_with_empty_signers, plan, SequencePolicy};
//! # fn example(mint_instructions: Vec<govflow::tx_builder::InstructionUnit>)
//! #     -> Result<(), govflow::tx_builder::BatchError> {
//! let batches = chunk_with_empty_signers(&mint_instructions, 10)?;
//! let schedule = plan(batches, SequencePolicy::Sequential);
//! // hand `schedule` to the submission engine
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub use errors::BatchError;

mod chunk;
mod envelope;
mod instructions;
mod plan;

pub use chunk::{chunk, chunk_with_empty_signers, pack_by_size, pair_with_signers};
pub use envelope::{encoded_size, TransactionEnvelope, TransportLimits, DEFAULT_MAX_INSTRUCTIONS};
pub use instructions::{InstructionBatch, InstructionUnit, SignerSet};
pub use plan::{into_phases, plan, Phase, SequencePolicy, TypedInstructionBatch};
