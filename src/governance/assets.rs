//! Asset discovery for a governance entity
//!
//! Finds the native treasury and the SPL token accounts held by the
//! governance (or its native treasury) and reports `{address, balance, kind}`.
//! The pipeline only consumes these tuples to build payload transfers.

use async_trait::async_trait;
use serde::Serialize;
use solana_account_decoder::UiAccountEncoding;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::{
    config::{RpcAccountInfoConfig, RpcProgramAccountsConfig},
    filter::{Memcmp, RpcFilterType},
};
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey};
use spl_token::solana_program::program_pack::Pack;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::governance::errors::PipelineError;
use crate::governance::instruction::GovernanceInstruction;
use crate::governance::pda;
use crate::rpc_manager::TransportError;

/// Offset of the owner field in an SPL token account
const TOKEN_ACCOUNT_OWNER_OFFSET: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum AssetKind {
    /// Lamports held by the native treasury
    Native,
    /// SPL token holding; `owner` is the account's transfer authority
    Token { mint: Pubkey, owner: Pubkey },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetAccount {
    pub address: Pubkey,
    pub balance: u64,
    pub kind: AssetKind,
}

/// Lists the asset accounts a governance controls
#[async_trait]
pub trait AssetDiscovery: Send + Sync {
    async fn discover(
        &self,
        program_id: &Pubkey,
        governance: &Pubkey,
    ) -> Result<Vec<AssetAccount>, PipelineError>;
}

/// Payload instruction moving `amount` out of a discovered asset account
///
/// The balance is checked here so an unfundable proposal is never assembled.
pub fn treasury_transfer(
    source: &AssetAccount,
    destination: &Pubkey,
    amount: u64,
) -> Result<GovernanceInstruction, PipelineError> {
    if amount > source.balance {
        return Err(PipelineError::InsufficientTreasuryBalance {
            address: source.address,
            available: source.balance,
            required: amount,
        });
    }
    Ok(GovernanceInstruction::PayloadTransfer {
        kind: source.kind,
        source: source.address,
        destination: *destination,
        amount,
    })
}

/// Decode an SPL token account into an asset entry
pub fn token_asset(address: Pubkey, data: &[u8]) -> Option<AssetAccount> {
    let account = spl_token::state::Account::unpack(data).ok()?;
    Some(AssetAccount {
        address,
        balance: account.amount,
        kind: AssetKind::Token {
            mint: account.mint,
            owner: account.owner,
        },
    })
}

/// JSON-RPC asset discovery
pub struct RpcAssetDiscovery {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
    endpoint: String,
}

impl RpcAssetDiscovery {
    pub fn new(client: Arc<RpcClient>, commitment: CommitmentConfig) -> Self {
        let endpoint = client.url();
        Self {
            client,
            commitment,
            endpoint,
        }
    }

    async fn token_accounts_owned_by(&self, owner: &Pubkey) -> Result<Vec<AssetAccount>, TransportError> {
        let config = RpcProgramAccountsConfig {
            filters: Some(vec![
                RpcFilterType::DataSize(spl_token::state::Account::LEN as u64),
                RpcFilterType::Memcmp(Memcmp::new_raw_bytes(
                    TOKEN_ACCOUNT_OWNER_OFFSET,
                    owner.to_bytes().to_vec(),
                )),
            ]),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                commitment: Some(self.commitment),
                ..RpcAccountInfoConfig::default()
            },
            ..RpcProgramAccountsConfig::default()
        };

        let accounts = self
            .client
            .get_program_accounts_with_config(&spl_token::id(), config)
            .await
            .map_err(|e| TransportError::from_client_error(e, &self.endpoint))?;

        Ok(accounts
            .into_iter()
            .filter_map(|(address, account)| {
                let asset = token_asset(address, &account.data);
                if asset.is_none() {
                    warn!(%address, "Skipping undecodable token account");
                }
                asset
            })
            .collect())
    }
}

#[async_trait]
impl AssetDiscovery for RpcAssetDiscovery {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn discover(
        &self,
        program_id: &Pubkey,
        governance: &Pubkey,
    ) -> Result<Vec<AssetAccount>, PipelineError> {
        let native_treasury = pda::native_treasury_address(program_id, governance);
        let lamports = self
            .client
            .get_balance_with_commitment(&native_treasury, self.commitment)
            .await
            .map_err(|e| TransportError::from_client_error(e, &self.endpoint))?
            .value;

        let mut assets = vec![AssetAccount {
            address: native_treasury,
            balance: lamports,
            kind: AssetKind::Native,
        }];
        for owner in [governance, &native_treasury] {
            assets.extend(self.token_accounts_owned_by(owner).await?);
        }

        debug!(count = assets.len(), "Discovered treasury assets");
        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spl_token::solana_program::program_option::COption;

    fn token_account_bytes(mint: Pubkey, owner: Pubkey, amount: u64) -> Vec<u8> {
        let account = spl_token::state::Account {
            mint,
            owner,
            amount,
            delegate: COption::None,
            state: spl_token::state::AccountState::Initialized,
            is_native: COption::None,
            delegated_amount: 0,
            close_authority: COption::None,
        };
        let mut data = vec![0u8; spl_token::state::Account::LEN];
        spl_token::state::Account::pack(account, &mut data).unwrap();
        data
    }

    fn native(balance: u64) -> AssetAccount {
        AssetAccount {
            address: Pubkey::new_unique(),
            balance,
            kind: AssetKind::Native,
        }
    }

    #[test]
    fn test_treasury_transfer_checks_balance() {
        let source = native(300_000_000);
        let err = treasury_transfer(&source, &Pubkey::new_unique(), 300_000_001).unwrap_err();
        assert_eq!(
            err,
            PipelineError::InsufficientTreasuryBalance {
                address: source.address,
                available: 300_000_000,
                required: 300_000_001,
            }
        );
    }

    #[test]
    fn test_treasury_transfer_native_payload() {
        let source = native(1_000_000_000);
        let destination = Pubkey::new_unique();
        let payload = treasury_transfer(&source, &destination, 300_000_000)
            .unwrap()
            .to_unit(&Pubkey::new_unique())
            .unwrap();

        assert_eq!(payload.program_id(), &solana_sdk::system_program::id());
        assert_eq!(payload.accounts()[0].pubkey, source.address);
        assert_eq!(payload.accounts()[1].pubkey, destination);
    }

    #[test]
    fn test_token_asset_decodes_owner_and_mint() {
        let mint = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let address = Pubkey::new_unique();

        let asset = token_asset(address, &token_account_bytes(mint, owner, 42)).unwrap();
        assert_eq!(asset.balance, 42);
        assert_eq!(asset.kind, AssetKind::Token { mint, owner });
        assert!(token_asset(address, &[0u8; 10]).is_none());
    }

    #[tokio::test]
    async fn test_discover_reports_native_treasury_balance() {
        use mockito::Matcher;
        use serde_json::json;

        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({"method": "getBalance"})))
            .with_header("content-type", "application/json")
            .with_body(
                json!({"jsonrpc": "2.0", "id": 1, "result": {"context": {"slot": 1}, "value": 5_000}})
                    .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({"method": "getProgramAccounts"})))
            .with_header("content-type", "application/json")
            .with_body(json!({"jsonrpc": "2.0", "id": 1, "result": []}).to_string())
            .expect(2)
            .create_async()
            .await;

        let client = Arc::new(RpcClient::new(server.url()));
        let discovery = RpcAssetDiscovery::new(client, CommitmentConfig::confirmed());
        let program = Pubkey::new_unique();
        let governance = Pubkey::new_unique();

        let assets = discovery.discover(&program, &governance).await.unwrap();
        assert_eq!(
            assets,
            vec![AssetAccount {
                address: pda::native_treasury_address(&program, &governance),
                balance: 5_000,
                kind: AssetKind::Native,
            }]
        );
    }
}
