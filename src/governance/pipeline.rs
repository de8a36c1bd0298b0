//! Proposal pipeline assembler
//!
//! Each step consumes the current [`PipelineState`] and returns the next one
//! with its instructions appended as a new [`Stage`]. Later steps read the
//! addresses earlier steps recorded (the proposal, the signatory record), so
//! the order is fixed:
//!
//! ```text
//! create_proposal → add_signatory → insert_transaction (1..n) → sign_off
//! ```
//!
//! Nothing here touches the network except the initial resolve performed by
//! [`ProposalPipeline::assemble`].

use solana_sdk::{pubkey::Pubkey, signature::Keypair};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::governance::errors::PipelineError;
use crate::governance::instruction::{GovernanceInstruction, VoteType};
use crate::governance::pda;
use crate::governance::resolver::{GovernanceResolver, GovernanceTarget, ResolvedGovernance};
use crate::tx_builder::{plan, InstructionBatch, InstructionUnit, SequencePolicy, SignerSet, TypedInstructionBatch};

/// Proposal option payload transactions are attached to
const PAYLOAD_OPTION_INDEX: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineStep {
    CreateProposal,
    AddSignatory,
    InsertTransaction,
    SignOff,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateProposal => "create_proposal",
            Self::AddSignatory => "add_signatory",
            Self::InsertTransaction => "insert_transaction",
            Self::SignOff => "sign_off",
        };
        f.write_str(name)
    }
}

/// Instructions contributed by one step, with the keys they need
#[derive(Debug, Clone)]
pub struct Stage {
    pub step: PipelineStep,
    pub instructions: Vec<InstructionUnit>,
    pub signers: SignerSet,
}

/// User-facing proposal fields
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalDraft {
    pub name: String,
    pub description_link: String,
    pub vote_type: VoteType,
    pub options: Vec<String>,
    pub use_deny_option: bool,
}

impl ProposalDraft {
    /// Single-choice Approve/Deny proposal
    pub fn approve_deny(name: impl Into<String>, description_link: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description_link: description_link.into(),
            vote_type: VoteType::SingleChoice,
            options: vec!["Approve".to_string()],
            use_deny_option: true,
        }
    }
}

/// Accumulated state of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineState {
    resolved: ResolvedGovernance,
    authority: Pubkey,
    payer: Pubkey,
    proposal: Option<Pubkey>,
    signatory: Option<Pubkey>,
    signatory_record: Option<Pubkey>,
    next_transaction_index: u16,
    stages: Vec<Stage>,
}

impl PipelineState {
    /// Start a run; `authority` owns the token owner record, `payer` funds rent
    pub fn new(resolved: ResolvedGovernance, authority: Pubkey, payer: Pubkey) -> Self {
        Self {
            resolved,
            authority,
            payer,
            proposal: None,
            signatory: None,
            signatory_record: None,
            next_transaction_index: 0,
            stages: Vec::new(),
        }
    }

    pub fn last_step(&self) -> Option<PipelineStep> {
        self.stages.last().map(|stage| stage.step)
    }

    pub fn proposal(&self) -> Option<Pubkey> {
        self.proposal
    }

    pub fn native_treasury(&self) -> Pubkey {
        self.resolved.native_treasury
    }

    pub fn resolved(&self) -> &ResolvedGovernance {
        &self.resolved
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    fn check_order(&self, step: PipelineStep) -> Result<(), PipelineError> {
        let last = self.last_step();
        let allowed = match step {
            PipelineStep::CreateProposal => last.is_none(),
            PipelineStep::AddSignatory => last == Some(PipelineStep::CreateProposal),
            PipelineStep::InsertTransaction => matches!(
                last,
                Some(PipelineStep::AddSignatory | PipelineStep::InsertTransaction)
            ),
            PipelineStep::SignOff => last == Some(PipelineStep::InsertTransaction),
        };
        if allowed {
            Ok(())
        } else {
            Err(PipelineError::OutOfOrder {
                step,
                after: last.map_or_else(|| "start".to_string(), |s| s.to_string()),
            })
        }
    }

    fn require_proposal(&self) -> Result<Pubkey, PipelineError> {
        self.proposal
            .ok_or_else(|| PipelineError::Incomplete("no proposal address recorded".to_string()))
    }

    fn push_stage(mut self, step: PipelineStep, instruction: GovernanceInstruction) -> Result<Self, PipelineError> {
        let unit = instruction.to_unit(&self.resolved.program_id)?;
        debug!(step = %step, kind = instruction.kind(), "Stage appended");
        self.stages.push(Stage {
            step,
            instructions: vec![unit],
            signers: SignerSet::new(),
        });
        Ok(self)
    }

    /// Append "create proposal" and record the derived proposal address
    pub fn create_proposal(mut self, draft: &ProposalDraft) -> Result<Self, PipelineError> {
        self.check_order(PipelineStep::CreateProposal)?;

        let proposal_index = self.resolved.next_proposal_index();
        let proposal = pda::proposal_address(
            &self.resolved.program_id,
            &self.resolved.governance.address,
            &self.resolved.governing_token_mint,
            proposal_index,
        );
        let instruction = GovernanceInstruction::CreateProposal {
            realm: self.resolved.realm.address,
            governance: self.resolved.governance.address,
            token_owner_record: self.resolved.token_owner_record.address,
            governing_token_mint: self.resolved.governing_token_mint,
            authority: self.authority,
            payer: self.payer,
            proposal_index,
            name: draft.name.clone(),
            description_link: draft.description_link.clone(),
            vote_type: draft.vote_type.clone(),
            options: draft.options.clone(),
            use_deny_option: draft.use_deny_option,
        };
        self.proposal = Some(proposal);
        self.push_stage(PipelineStep::CreateProposal, instruction)
    }

    /// Append "add signatory" against the recorded proposal
    pub fn add_signatory(mut self, signatory: Pubkey) -> Result<Self, PipelineError> {
        self.check_order(PipelineStep::AddSignatory)?;
        let proposal = self.require_proposal()?;

        let instruction = GovernanceInstruction::AddSignatory {
            proposal,
            token_owner_record: self.resolved.token_owner_record.address,
            authority: self.authority,
            signatory,
            payer: self.payer,
        };
        self.signatory = Some(signatory);
        self.signatory_record = Some(pda::signatory_record_address(
            &self.resolved.program_id,
            &proposal,
            &signatory,
        ));
        self.push_stage(PipelineStep::AddSignatory, instruction)
    }

    /// Append "insert transaction" embedding opaque payload instructions
    ///
    /// `hold_up_time` defaults to the governance's configured minimum.
    pub fn insert_transaction(
        mut self,
        payload: Vec<InstructionUnit>,
        hold_up_time: Option<u32>,
    ) -> Result<Self, PipelineError> {
        self.check_order(PipelineStep::InsertTransaction)?;
        let proposal = self.require_proposal()?;
        if payload.is_empty() {
            return Err(PipelineError::EmptyPayload);
        }

        let minimum = self.resolved.governance.min_transaction_hold_up_time;
        let hold_up_time = hold_up_time.unwrap_or(minimum);
        if hold_up_time < minimum {
            return Err(PipelineError::HoldUpTooShort {
                requested: hold_up_time,
                minimum,
            });
        }

        let index = self.next_transaction_index;
        let instruction = GovernanceInstruction::InsertTransaction {
            governance: self.resolved.governance.address,
            proposal,
            token_owner_record: self.resolved.token_owner_record.address,
            authority: self.authority,
            payer: self.payer,
            option_index: PAYLOAD_OPTION_INDEX,
            index,
            hold_up_time,
            payload,
        };
        self.next_transaction_index = index
            .checked_add(1)
            .ok_or_else(|| PipelineError::Encoding("transaction index overflow".to_string()))?;
        self.push_stage(PipelineStep::InsertTransaction, instruction)
    }

    /// Append "sign off", marking the proposal ready for voting
    pub fn sign_off(self) -> Result<Self, PipelineError> {
        self.check_order(PipelineStep::SignOff)?;
        let proposal = self.require_proposal()?;
        let signatory = self
            .signatory
            .ok_or_else(|| PipelineError::Incomplete("no signatory recorded".to_string()))?;

        let instruction = GovernanceInstruction::SignOffProposal {
            realm: self.resolved.realm.address,
            governance: self.resolved.governance.address,
            proposal,
            signatory,
            signatory_record: self.signatory_record,
            token_owner_record: self.resolved.token_owner_record.address,
        };
        self.push_stage(PipelineStep::SignOff, instruction)
    }

    /// Attach a key generated mid-pipeline to the most recent stage
    pub fn attach_signer(mut self, keypair: Arc<Keypair>) -> Result<Self, PipelineError> {
        let stage = self
            .stages
            .last_mut()
            .ok_or_else(|| PipelineError::Incomplete("no stage to attach a signer to".to_string()))?;
        stage.signers.insert(keypair);
        Ok(self)
    }

    /// Close the run; only a signed-off proposal is complete
    pub fn finish(self) -> Result<AssembledProposal, PipelineError> {
        if self.last_step() != Some(PipelineStep::SignOff) {
            return Err(PipelineError::Incomplete(format!(
                "pipeline ended after {}",
                self.last_step()
                    .map_or_else(|| "start".to_string(), |s| s.to_string())
            )));
        }
        let proposal = self.require_proposal()?;
        Ok(AssembledProposal {
            proposal,
            proposal_index: self.resolved.next_proposal_index(),
            native_treasury: self.resolved.native_treasury,
            stages: self.stages,
        })
    }
}

/// Output of a complete pipeline run
#[derive(Debug, Clone)]
pub struct AssembledProposal {
    pub proposal: Pubkey,
    pub proposal_index: u32,
    pub native_treasury: Pubkey,
    pub stages: Vec<Stage>,
}

impl AssembledProposal {
    pub fn steps(&self) -> Vec<PipelineStep> {
        self.stages.iter().map(|stage| stage.step).collect()
    }

    /// Every instruction in pipeline order
    pub fn flat_instructions(&self) -> Vec<InstructionUnit> {
        self.stages
            .iter()
            .flat_map(|stage| stage.instructions.iter().cloned())
            .collect()
    }

    /// One batch per step, in pipeline order
    pub fn into_step_batches(self) -> Vec<InstructionBatch> {
        self.stages
            .into_iter()
            .map(|stage| InstructionBatch::new(stage.instructions, stage.signers))
            .collect()
    }

    /// Step batches tagged for strictly ordered submission
    ///
    /// Every step depends on the previous one, so nothing but `Sequential`
    /// is valid within one proposal.
    pub fn into_schedule(self) -> Vec<TypedInstructionBatch> {
        plan(self.into_step_batches(), SequencePolicy::Sequential)
    }
}

/// What to propose
#[derive(Debug, Clone)]
pub struct ProposalRequest {
    pub draft: ProposalDraft,
    pub signatory: Pubkey,
    /// Payload transactions, each inserted as its own proposal transaction
    pub payload: Vec<Vec<InstructionUnit>>,
    pub hold_up_time: Option<u32>,
}

/// Resolve, then run every step in order
pub struct ProposalPipeline<R: ?Sized> {
    resolver: Arc<R>,
    target: GovernanceTarget,
}

impl<R: GovernanceResolver + ?Sized> ProposalPipeline<R> {
    pub fn new(resolver: Arc<R>, target: GovernanceTarget) -> Self {
        Self { resolver, target }
    }

    pub fn target(&self) -> &GovernanceTarget {
        &self.target
    }

    /// Assemble a complete proposal
    ///
    /// Fails before producing anything if resolution or any step fails.
    pub async fn assemble(
        &self,
        payer: Pubkey,
        request: ProposalRequest,
    ) -> Result<AssembledProposal, PipelineError> {
        let resolved = self.resolver.resolve(&self.target).await?;

        let mut state = PipelineState::new(resolved, self.target.token_owner, payer)
            .create_proposal(&request.draft)?
            .add_signatory(request.signatory)?;
        if request.payload.is_empty() {
            return Err(PipelineError::EmptyPayload);
        }
        for transaction in request.payload {
            state = state.insert_transaction(transaction, request.hold_up_time)?;
        }
        let assembled = state.sign_off()?.finish()?;

        info!(
            proposal = %assembled.proposal,
            index = assembled.proposal_index,
            stages = assembled.stages.len(),
            "Proposal assembled"
        );
        Ok(assembled)
    }
}
