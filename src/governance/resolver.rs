//! Read-only resolution of the governance a proposal is created under
//!
//! The realm, governance and proposer's token owner record are fetched in one
//! `getMultipleAccounts` round trip, then checked against each other. Any
//! mismatch aborts the pipeline before a single instruction exists.

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{account::Account, commitment_config::CommitmentConfig, pubkey::Pubkey};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{info, instrument, warn};

use crate::governance::accounts::{
    decode_governance, decode_realm, decode_token_owner_record, GovernanceInfo, RealmInfo,
    TokenOwnerRecordInfo,
};
use crate::governance::errors::PipelineError;
use crate::governance::pda;
use crate::rpc_manager::TransportError;

/// What the caller wants to create a proposal under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernanceTarget {
    pub program_id: Pubkey,
    pub realm: Pubkey,
    pub governance: Pubkey,
    /// Mint whose deposit backs the proposal (community or council)
    pub governing_token_mint: Pubkey,
    /// Owner of the token owner record, normally the wallet
    pub token_owner: Pubkey,
}

impl GovernanceTarget {
    pub fn token_owner_record_address(&self) -> Pubkey {
        pda::token_owner_record_address(
            &self.program_id,
            &self.realm,
            &self.governing_token_mint,
            &self.token_owner,
        )
    }
}

/// Everything the pipeline reads from chain before assembling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGovernance {
    pub program_id: Pubkey,
    pub governing_token_mint: Pubkey,
    pub realm: RealmInfo,
    pub governance: GovernanceInfo,
    pub token_owner_record: TokenOwnerRecordInfo,
    pub native_treasury: Pubkey,
}

impl ResolvedGovernance {
    /// Validate fetched accounts against the target
    pub fn from_accounts(
        target: &GovernanceTarget,
        realm: Option<&Account>,
        governance: Option<&Account>,
        token_owner_record: Option<&Account>,
    ) -> Result<Self, PipelineError> {
        let realm_account = realm.ok_or(PipelineError::RealmNotFound(target.realm))?;
        let realm = decode_realm(&target.realm, realm_account, &target.program_id)?;
        if !realm.governs_mint(&target.governing_token_mint) {
            return Err(PipelineError::MintNotGoverned {
                mint: target.governing_token_mint,
                realm: target.realm,
            });
        }

        let governance_account =
            governance.ok_or(PipelineError::GovernanceNotFound(target.governance))?;
        let governance = decode_governance(&target.governance, governance_account, &target.program_id)?;
        if governance.realm != target.realm {
            return Err(PipelineError::InvalidAccount {
                address: target.governance,
                reason: format!("governance belongs to realm {}", governance.realm),
            });
        }

        let tor_address = target.token_owner_record_address();
        let tor_account = token_owner_record.ok_or(PipelineError::TokenOwnerRecordNotFound {
            owner: target.token_owner,
            mint: target.governing_token_mint,
        })?;
        let token_owner_record = decode_token_owner_record(&tor_address, tor_account, &target.program_id)?;
        if token_owner_record.realm != target.realm
            || token_owner_record.governing_token_mint != target.governing_token_mint
            || token_owner_record.governing_token_owner != target.token_owner
        {
            return Err(PipelineError::InvalidAccount {
                address: tor_address,
                reason: "token owner record does not match realm, mint and owner".to_string(),
            });
        }

        Ok(Self {
            program_id: target.program_id,
            governing_token_mint: target.governing_token_mint,
            native_treasury: pda::native_treasury_address(&target.program_id, &target.governance),
            realm,
            governance,
            token_owner_record,
        })
    }

    /// Index the next proposal will be created with
    pub fn next_proposal_index(&self) -> u32 {
        self.governance.proposals_count
    }
}

/// Step 1 of the pipeline: read-only lookup of the target governance
#[async_trait]
pub trait GovernanceResolver: Send + Sync {
    async fn resolve(&self, target: &GovernanceTarget) -> Result<ResolvedGovernance, PipelineError>;
}

/// JSON-RPC resolver
pub struct RpcGovernanceResolver {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
    endpoint: String,
    max_retries: usize,
}

impl RpcGovernanceResolver {
    pub fn new(client: Arc<RpcClient>, commitment: CommitmentConfig, max_retries: usize) -> Self {
        let endpoint = client.url();
        Self {
            client,
            commitment,
            endpoint,
            max_retries,
        }
    }

    async fn fetch_accounts(&self, addresses: &[Pubkey]) -> Result<Vec<Option<Account>>, TransportError> {
        let strategy = ExponentialBackoff::from_millis(50)
            .max_delay(Duration::from_secs(2))
            .map(jitter)
            .take(self.max_retries);

        RetryIf::spawn(
            strategy,
            || async {
                self.client
                    .get_multiple_accounts_with_commitment(addresses, self.commitment)
                    .await
                    .map(|response| response.value)
                    .map_err(|e| {
                        let err = TransportError::from_client_error(e, &self.endpoint);
                        warn!(error = %err, "Account fetch failed");
                        err
                    })
            },
            |err: &TransportError| err.is_retryable(),
        )
        .await
    }
}

#[async_trait]
impl GovernanceResolver for RpcGovernanceResolver {
    #[instrument(skip(self, target), fields(governance = %target.governance))]
    async fn resolve(&self, target: &GovernanceTarget) -> Result<ResolvedGovernance, PipelineError> {
        let addresses = [
            target.realm,
            target.governance,
            target.token_owner_record_address(),
        ];
        let accounts = self.fetch_accounts(&addresses).await?;

        let resolved = ResolvedGovernance::from_accounts(
            target,
            accounts.first().and_then(Option::as_ref),
            accounts.get(1).and_then(Option::as_ref),
            accounts.get(2).and_then(Option::as_ref),
        )?;
        info!(
            proposal_index = resolved.next_proposal_index(),
            hold_up = resolved.governance.min_transaction_hold_up_time,
            "Resolved governance"
        );
        Ok(resolved)
    }
}
