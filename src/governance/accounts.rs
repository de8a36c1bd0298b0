//! Decoding of governance program accounts
//!
//! Only the leading fields the pipeline needs are read; trailing fields that
//! vary between program releases are ignored.

use borsh::BorshDeserialize;
use solana_sdk::{account::Account, pubkey::Pubkey};

use crate::governance::errors::PipelineError;

const REALM_TYPES: &[u8] = &[1, 16];
const TOKEN_OWNER_RECORD_TYPES: &[u8] = &[2, 17];
/// Account, program, mint and token governances, v1 and v2
const GOVERNANCE_TYPES: &[u8] = &[3, 4, 9, 10, 18, 19, 20, 21];

#[derive(BorshDeserialize)]
enum MintMaxVoterWeightSource {
    #[allow(dead_code)]
    SupplyFraction(u64),
    #[allow(dead_code)]
    Absolute(u64),
}

#[derive(BorshDeserialize)]
#[allow(dead_code)]
struct RealmConfigPrefix {
    legacy1: u8,
    legacy2: u8,
    reserved: [u8; 6],
    min_community_weight_to_create_governance: u64,
    community_mint_max_voter_weight_source: MintMaxVoterWeightSource,
    council_mint: Option<[u8; 32]>,
}

#[derive(BorshDeserialize)]
#[allow(dead_code)]
struct RealmPrefix {
    account_type: u8,
    community_mint: [u8; 32],
    config: RealmConfigPrefix,
}

#[derive(BorshDeserialize)]
enum VoteThreshold {
    #[allow(dead_code)]
    YesVotePercentage(u8),
    #[allow(dead_code)]
    QuorumPercentage(u8),
    Disabled,
}

#[derive(BorshDeserialize)]
#[allow(dead_code)]
struct GovernanceConfigPrefix {
    community_vote_threshold: VoteThreshold,
    min_community_weight_to_create_proposal: u64,
    min_transaction_hold_up_time: u32,
}

#[derive(BorshDeserialize)]
#[allow(dead_code)]
struct GovernancePrefix {
    account_type: u8,
    realm: [u8; 32],
    governed_account: [u8; 32],
    proposals_count: u32,
    config: GovernanceConfigPrefix,
}

#[derive(BorshDeserialize)]
#[allow(dead_code)]
struct TokenOwnerRecordPrefix {
    account_type: u8,
    realm: [u8; 32],
    governing_token_mint: [u8; 32],
    governing_token_owner: [u8; 32],
    governing_token_deposit_amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealmInfo {
    pub address: Pubkey,
    pub community_mint: Pubkey,
    pub council_mint: Option<Pubkey>,
}

impl RealmInfo {
    /// Whether `mint` is one of the realm's governing mints
    pub fn governs_mint(&self, mint: &Pubkey) -> bool {
        &self.community_mint == mint || self.council_mint.as_ref() == Some(mint)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernanceInfo {
    pub address: Pubkey,
    pub realm: Pubkey,
    pub governed_account: Pubkey,
    /// Number of proposals created so far; the next proposal's index
    pub proposals_count: u32,
    pub min_transaction_hold_up_time: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenOwnerRecordInfo {
    pub address: Pubkey,
    pub realm: Pubkey,
    pub governing_token_mint: Pubkey,
    pub governing_token_owner: Pubkey,
    pub deposit_amount: u64,
}

fn invalid(address: &Pubkey, reason: impl Into<String>) -> PipelineError {
    PipelineError::InvalidAccount {
        address: *address,
        reason: reason.into(),
    }
}

/// Check the owning program and account type, then decode the leading fields
fn decode_prefix<T: BorshDeserialize>(
    address: &Pubkey,
    account: &Account,
    program_id: &Pubkey,
    allowed_types: &[u8],
    what: &str,
) -> Result<T, PipelineError> {
    if &account.owner != program_id {
        return Err(invalid(
            address,
            format!("{} is owned by {}, not {}", what, account.owner, program_id),
        ));
    }
    match account.data.first() {
        Some(account_type) if allowed_types.contains(account_type) => {}
        Some(account_type) => {
            return Err(invalid(
                address,
                format!("account type {} is not a {}", account_type, what),
            ))
        }
        None => return Err(invalid(address, format!("{} has no data", what))),
    }
    T::deserialize(&mut account.data.as_slice())
        .map_err(|e| invalid(address, format!("cannot decode {}: {}", what, e)))
}

pub fn decode_realm(address: &Pubkey, account: &Account, program_id: &Pubkey) -> Result<RealmInfo, PipelineError> {
    let raw: RealmPrefix = decode_prefix(address, account, program_id, REALM_TYPES, "realm")?;
    Ok(RealmInfo {
        address: *address,
        community_mint: Pubkey::new_from_array(raw.community_mint),
        council_mint: raw.config.council_mint.map(Pubkey::new_from_array),
    })
}

pub fn decode_governance(
    address: &Pubkey,
    account: &Account,
    program_id: &Pubkey,
) -> Result<GovernanceInfo, PipelineError> {
    let raw: GovernancePrefix =
        decode_prefix(address, account, program_id, GOVERNANCE_TYPES, "governance")?;
    Ok(GovernanceInfo {
        address: *address,
        realm: Pubkey::new_from_array(raw.realm),
        governed_account: Pubkey::new_from_array(raw.governed_account),
        proposals_count: raw.proposals_count,
        min_transaction_hold_up_time: raw.config.min_transaction_hold_up_time,
    })
}

pub fn decode_token_owner_record(
    address: &Pubkey,
    account: &Account,
    program_id: &Pubkey,
) -> Result<TokenOwnerRecordInfo, PipelineError> {
    let raw: TokenOwnerRecordPrefix = decode_prefix(
        address,
        account,
        program_id,
        TOKEN_OWNER_RECORD_TYPES,
        "token owner record",
    )?;
    Ok(TokenOwnerRecordInfo {
        address: *address,
        realm: Pubkey::new_from_array(raw.realm),
        governing_token_mint: Pubkey::new_from_array(raw.governing_token_mint),
        governing_token_owner: Pubkey::new_from_array(raw.governing_token_owner),
        deposit_amount: raw.governing_token_deposit_amount,
    })
}

/// Byte layouts of the accounts above, for fabricating fixtures
#[cfg(any(test, feature = "test_utils"))]
pub mod layout {
    use solana_sdk::pubkey::Pubkey;

    pub fn realm(community_mint: &Pubkey, council_mint: Option<&Pubkey>) -> Vec<u8> {
        let mut data = vec![16u8];
        data.extend_from_slice(community_mint.as_ref());
        data.extend_from_slice(&[0u8; 8]); // legacy fields, reserved
        data.extend_from_slice(&1u64.to_le_bytes());
        data.push(0); // SupplyFraction
        data.extend_from_slice(&10_000_000_000u64.to_le_bytes());
        match council_mint {
            Some(mint) => {
                data.push(1);
                data.extend_from_slice(mint.as_ref());
            }
            None => data.push(0),
        }
        data.extend_from_slice(&[0u8; 64]);
        data
    }

    pub fn governance(realm: &Pubkey, proposals_count: u32, min_hold_up_time: u32) -> Vec<u8> {
        let mut data = vec![18u8];
        data.extend_from_slice(realm.as_ref());
        data.extend_from_slice(Pubkey::new_unique().as_ref());
        data.extend_from_slice(&proposals_count.to_le_bytes());
        data.extend_from_slice(&[0, 60]); // YesVotePercentage(60)
        data.extend_from_slice(&1u64.to_le_bytes());
        data.extend_from_slice(&min_hold_up_time.to_le_bytes());
        data.extend_from_slice(&[0u8; 64]);
        data
    }

    pub fn token_owner_record(realm: &Pubkey, mint: &Pubkey, owner: &Pubkey, deposit: u64) -> Vec<u8> {
        let mut data = vec![17u8];
        data.extend_from_slice(realm.as_ref());
        data.extend_from_slice(mint.as_ref());
        data.extend_from_slice(owner.as_ref());
        data.extend_from_slice(&deposit.to_le_bytes());
        data.extend_from_slice(&[0u8; 64]);
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(program_id: &Pubkey, data: Vec<u8>) -> Account {
        Account {
            lamports: 1,
            data,
            owner: *program_id,
            executable: false,
            rent_epoch: 0,
        }
    }

    #[test]
    fn test_decode_realm_with_council() {
        let program = Pubkey::new_unique();
        let address = Pubkey::new_unique();
        let community = Pubkey::new_unique();
        let council = Pubkey::new_unique();

        let realm = decode_realm(
            &address,
            &owned(&program, layout::realm(&community, Some(&council))),
            &program,
        )
        .unwrap();
        assert_eq!(realm.community_mint, community);
        assert_eq!(realm.council_mint, Some(council));
        assert!(realm.governs_mint(&council));
        assert!(!realm.governs_mint(&Pubkey::new_unique()));
    }

    #[test]
    fn test_decode_governance_reads_counter_and_hold_up() {
        let program = Pubkey::new_unique();
        let realm = Pubkey::new_unique();
        let governance = decode_governance(
            &Pubkey::new_unique(),
            &owned(&program, layout::governance(&realm, 7, 3_600)),
            &program,
        )
        .unwrap();
        assert_eq!(governance.realm, realm);
        assert_eq!(governance.proposals_count, 7);
        assert_eq!(governance.min_transaction_hold_up_time, 3_600);
    }

    #[test]
    fn test_disabled_threshold_has_no_value_byte() {
        let program = Pubkey::new_unique();
        let realm = Pubkey::new_unique();
        let mut data = vec![18u8];
        data.extend_from_slice(realm.as_ref());
        data.extend_from_slice(Pubkey::new_unique().as_ref());
        data.extend_from_slice(&2u32.to_le_bytes());
        data.push(2); // Disabled
        data.extend_from_slice(&1u64.to_le_bytes());
        data.extend_from_slice(&120u32.to_le_bytes());

        let governance = decode_governance(&Pubkey::new_unique(), &owned(&program, data), &program).unwrap();
        assert_eq!(governance.min_transaction_hold_up_time, 120);
    }

    #[test]
    fn test_rejects_foreign_owner_and_wrong_type() {
        let program = Pubkey::new_unique();
        let realm = Pubkey::new_unique();
        let address = Pubkey::new_unique();

        let foreign = owned(&Pubkey::new_unique(), layout::governance(&realm, 0, 0));
        assert!(matches!(
            decode_governance(&address, &foreign, &program),
            Err(PipelineError::InvalidAccount { .. })
        ));

        let tor_bytes = layout::token_owner_record(&realm, &Pubkey::new_unique(), &Pubkey::new_unique(), 1);
        let err = decode_governance(&address, &owned(&program, tor_bytes), &program).unwrap_err();
        assert!(err.to_string().contains("account type 17"));
    }

    #[test]
    fn test_truncated_account_is_invalid() {
        let program = Pubkey::new_unique();
        let err = decode_token_owner_record(&Pubkey::new_unique(), &owned(&program, vec![17u8; 20]), &program)
            .unwrap_err();
        assert_eq!(err.category(), "invalid_account");
    }
}
