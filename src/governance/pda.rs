//! Program-derived addresses of the governance program (v2 seeds)

use solana_sdk::pubkey::Pubkey;

pub const GOVERNANCE_SEED: &[u8] = b"governance";
pub const NATIVE_TREASURY_SEED: &[u8] = b"native-treasury";
pub const REALM_CONFIG_SEED: &[u8] = b"realm-config";

/// Proposal created with sequence number `proposal_index` under a governance
pub fn proposal_address(
    program_id: &Pubkey,
    governance: &Pubkey,
    governing_token_mint: &Pubkey,
    proposal_index: u32,
) -> Pubkey {
    Pubkey::find_program_address(
        &[
            GOVERNANCE_SEED,
            governance.as_ref(),
            governing_token_mint.as_ref(),
            &proposal_index.to_le_bytes(),
        ],
        program_id,
    )
    .0
}

pub fn signatory_record_address(program_id: &Pubkey, proposal: &Pubkey, signatory: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[GOVERNANCE_SEED, proposal.as_ref(), signatory.as_ref()],
        program_id,
    )
    .0
}

pub fn proposal_transaction_address(
    program_id: &Pubkey,
    proposal: &Pubkey,
    option_index: u8,
    transaction_index: u16,
) -> Pubkey {
    Pubkey::find_program_address(
        &[
            GOVERNANCE_SEED,
            proposal.as_ref(),
            &option_index.to_le_bytes(),
            &transaction_index.to_le_bytes(),
        ],
        program_id,
    )
    .0
}

pub fn token_owner_record_address(
    program_id: &Pubkey,
    realm: &Pubkey,
    governing_token_mint: &Pubkey,
    governing_token_owner: &Pubkey,
) -> Pubkey {
    Pubkey::find_program_address(
        &[
            GOVERNANCE_SEED,
            realm.as_ref(),
            governing_token_mint.as_ref(),
            governing_token_owner.as_ref(),
        ],
        program_id,
    )
    .0
}

/// System account holding native currency on behalf of a governance
pub fn native_treasury_address(program_id: &Pubkey, governance: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[NATIVE_TREASURY_SEED, governance.as_ref()], program_id).0
}

pub fn realm_config_address(program_id: &Pubkey, realm: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[REALM_CONFIG_SEED, realm.as_ref()], program_id).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposal_address_depends_on_index() {
        let program = Pubkey::new_unique();
        let governance = Pubkey::new_unique();
        let mint = Pubkey::new_unique();

        let first = proposal_address(&program, &governance, &mint, 0);
        assert_eq!(first, proposal_address(&program, &governance, &mint, 0));
        assert_ne!(first, proposal_address(&program, &governance, &mint, 1));
    }

    #[test]
    fn test_addresses_are_off_curve() {
        let program = Pubkey::new_unique();
        let governance = Pubkey::new_unique();
        assert!(!native_treasury_address(&program, &governance).is_on_curve());
        assert!(!realm_config_address(&program, &governance).is_on_curve());
    }

    #[test]
    fn test_transaction_address_varies_by_option_and_index() {
        let program = Pubkey::new_unique();
        let proposal = Pubkey::new_unique();
        let a = proposal_transaction_address(&program, &proposal, 0, 0);
        assert_ne!(a, proposal_transaction_address(&program, &proposal, 0, 1));
        assert_ne!(a, proposal_transaction_address(&program, &proposal, 1, 0));
    }
}
