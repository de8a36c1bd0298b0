//! Governance proposal assembly
//!
//! Builds the instruction list of one proposal
//! (create → add signatory → insert transaction → sign off) against the
//! governance program, after resolving the target governance from chain.
//! Submission is left to [`crate::submission`].

pub mod accounts;
pub mod assets;
pub mod errors;
pub mod instruction;
pub mod pda;
pub mod pipeline;
pub mod resolver;

pub use assets::{treasury_transfer, AssetAccount, AssetDiscovery, AssetKind, RpcAssetDiscovery};
pub use errors::PipelineError;
pub use instruction::{GovernanceInstruction, VoteType};
pub use pipeline::{
    AssembledProposal, PipelineState, PipelineStep, ProposalDraft, ProposalPipeline,
    ProposalRequest, Stage,
};
pub use resolver::{GovernanceResolver, GovernanceTarget, ResolvedGovernance, RpcGovernanceResolver};
