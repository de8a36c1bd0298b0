//! Governance program instructions (program version 2)
//!
//! A closed set of variants, each carrying exactly the fields its instruction
//! needs. `to_unit` produces the wire instruction: one tag byte followed by
//! the borsh-encoded arguments.

use borsh::BorshSerialize;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_instruction, system_program, sysvar,
};

use crate::governance::assets::AssetKind;
use crate::governance::errors::PipelineError;
use crate::governance::pda;
use crate::tx_builder::InstructionUnit;

const CREATE_PROPOSAL_TAG: u8 = 6;
const ADD_SIGNATORY_TAG: u8 = 7;
const INSERT_TRANSACTION_TAG: u8 = 9;
const SIGN_OFF_PROPOSAL_TAG: u8 = 12;

/// How votes on the proposal's options are counted
#[derive(BorshSerialize, Debug, Clone, PartialEq, Eq)]
pub enum VoteType {
    SingleChoice,
    MultiChoice {
        max_voter_options: u8,
        max_winning_options: u8,
    },
}

#[derive(BorshSerialize)]
struct CreateProposalArgs<'a> {
    name: &'a str,
    description_link: &'a str,
    vote_type: &'a VoteType,
    options: &'a [String],
    use_deny_option: bool,
}

#[derive(BorshSerialize)]
struct AddSignatoryArgs {
    signatory: [u8; 32],
}

#[derive(BorshSerialize)]
struct AccountMetaData {
    pubkey: [u8; 32],
    is_signer: bool,
    is_writable: bool,
}

/// A payload instruction as stored inside a proposal transaction
#[derive(BorshSerialize)]
struct InstructionData {
    program_id: [u8; 32],
    accounts: Vec<AccountMetaData>,
    data: Vec<u8>,
}

impl From<&InstructionUnit> for InstructionData {
    fn from(unit: &InstructionUnit) -> Self {
        Self {
            program_id: unit.program_id().to_bytes(),
            accounts: unit
                .accounts()
                .iter()
                .map(|meta| AccountMetaData {
                    pubkey: meta.pubkey.to_bytes(),
                    is_signer: meta.is_signer,
                    is_writable: meta.is_writable,
                })
                .collect(),
            data: unit.data().to_vec(),
        }
    }
}

#[derive(BorshSerialize)]
struct InsertTransactionArgs {
    option_index: u8,
    index: u16,
    hold_up_time: u32,
    instructions: Vec<InstructionData>,
}

/// Instructions the proposal pipeline can emit
#[derive(Debug, Clone, PartialEq)]
pub enum GovernanceInstruction {
    /// Accounts:
    /// 0. `[]` realm
    /// 1. `[writable]` proposal (PDA)
    /// 2. `[writable]` governance
    /// 3. `[writable]` proposal owner token owner record
    /// 4. `[]` governing token mint
    /// 5. `[signer]` governance authority
    /// 6. `[writable, signer]` payer
    /// 7. `[]` system program
    /// 8. `[]` realm config (PDA)
    CreateProposal {
        realm: Pubkey,
        governance: Pubkey,
        token_owner_record: Pubkey,
        governing_token_mint: Pubkey,
        authority: Pubkey,
        payer: Pubkey,
        proposal_index: u32,
        name: String,
        description_link: String,
        vote_type: VoteType,
        options: Vec<String>,
        use_deny_option: bool,
    },

    /// Accounts:
    /// 0. `[writable]` proposal
    /// 1. `[]` token owner record
    /// 2. `[signer]` governance authority
    /// 3. `[writable]` signatory record (PDA)
    /// 4. `[writable, signer]` payer
    /// 5. `[]` system program
    AddSignatory {
        proposal: Pubkey,
        token_owner_record: Pubkey,
        authority: Pubkey,
        signatory: Pubkey,
        payer: Pubkey,
    },

    /// Accounts:
    /// 0. `[]` governance
    /// 1. `[writable]` proposal
    /// 2. `[]` token owner record
    /// 3. `[signer]` governance authority
    /// 4. `[writable]` proposal transaction (PDA)
    /// 5. `[writable, signer]` payer
    /// 6. `[]` system program
    /// 7. `[]` rent sysvar
    InsertTransaction {
        governance: Pubkey,
        proposal: Pubkey,
        token_owner_record: Pubkey,
        authority: Pubkey,
        payer: Pubkey,
        option_index: u8,
        index: u16,
        hold_up_time: u32,
        payload: Vec<InstructionUnit>,
    },

    /// Accounts:
    /// 0. `[]` realm
    /// 1. `[]` governance
    /// 2. `[writable]` proposal
    /// 3. `[signer]` signatory
    /// 4. `[writable]` signatory record, or `[]` token owner record when absent
    SignOffProposal {
        realm: Pubkey,
        governance: Pubkey,
        proposal: Pubkey,
        signatory: Pubkey,
        signatory_record: Option<Pubkey>,
        token_owner_record: Pubkey,
    },

    /// Transfer out of a treasury account, executed by the proposal once passed
    PayloadTransfer {
        kind: AssetKind,
        source: Pubkey,
        destination: Pubkey,
        amount: u64,
    },
}

fn encode<A: BorshSerialize>(tag: u8, args: &A) -> Result<Vec<u8>, PipelineError> {
    let mut data = vec![tag];
    args.serialize(&mut data)
        .map_err(|e| PipelineError::Encoding(e.to_string()))?;
    Ok(data)
}

impl GovernanceInstruction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateProposal { .. } => "create_proposal",
            Self::AddSignatory { .. } => "add_signatory",
            Self::InsertTransaction { .. } => "insert_transaction",
            Self::SignOffProposal { .. } => "sign_off_proposal",
            Self::PayloadTransfer { .. } => "payload_transfer",
        }
    }

    /// Encode against a governance program deployment
    ///
    /// `program_id` is ignored by `PayloadTransfer`, which targets the
    /// system or token program.
    pub fn to_unit(&self, program_id: &Pubkey) -> Result<InstructionUnit, PipelineError> {
        let instruction = match self {
            Self::CreateProposal {
                realm,
                governance,
                token_owner_record,
                governing_token_mint,
                authority,
                payer,
                proposal_index,
                name,
                description_link,
                vote_type,
                options,
                use_deny_option,
            } => {
                let proposal = pda::proposal_address(
                    program_id,
                    governance,
                    governing_token_mint,
                    *proposal_index,
                );
                let data = encode(
                    CREATE_PROPOSAL_TAG,
                    &CreateProposalArgs {
                        name,
                        description_link,
                        vote_type,
                        options,
                        use_deny_option: *use_deny_option,
                    },
                )?;
                Instruction {
                    program_id: *program_id,
                    accounts: vec![
                        AccountMeta::new_readonly(*realm, false),
                        AccountMeta::new(proposal, false),
                        AccountMeta::new(*governance, false),
                        AccountMeta::new(*token_owner_record, false),
                        AccountMeta::new_readonly(*governing_token_mint, false),
                        AccountMeta::new_readonly(*authority, true),
                        AccountMeta::new(*payer, true),
                        AccountMeta::new_readonly(system_program::id(), false),
                        AccountMeta::new_readonly(pda::realm_config_address(program_id, realm), false),
                    ],
                    data,
                }
            }

            Self::AddSignatory {
                proposal,
                token_owner_record,
                authority,
                signatory,
                payer,
            } => {
                let signatory_record = pda::signatory_record_address(program_id, proposal, signatory);
                let data = encode(
                    ADD_SIGNATORY_TAG,
                    &AddSignatoryArgs {
                        signatory: signatory.to_bytes(),
                    },
                )?;
                Instruction {
                    program_id: *program_id,
                    accounts: vec![
                        AccountMeta::new(*proposal, false),
                        AccountMeta::new_readonly(*token_owner_record, false),
                        AccountMeta::new_readonly(*authority, true),
                        AccountMeta::new(signatory_record, false),
                        AccountMeta::new(*payer, true),
                        AccountMeta::new_readonly(system_program::id(), false),
                    ],
                    data,
                }
            }

            Self::InsertTransaction {
                governance,
                proposal,
                token_owner_record,
                authority,
                payer,
                option_index,
                index,
                hold_up_time,
                payload,
            } => {
                if payload.is_empty() {
                    return Err(PipelineError::EmptyPayload);
                }
                let proposal_transaction =
                    pda::proposal_transaction_address(program_id, proposal, *option_index, *index);
                let data = encode(
                    INSERT_TRANSACTION_TAG,
                    &InsertTransactionArgs {
                        option_index: *option_index,
                        index: *index,
                        hold_up_time: *hold_up_time,
                        instructions: payload.iter().map(InstructionData::from).collect(),
                    },
                )?;
                Instruction {
                    program_id: *program_id,
                    accounts: vec![
                        AccountMeta::new_readonly(*governance, false),
                        AccountMeta::new(*proposal, false),
                        AccountMeta::new_readonly(*token_owner_record, false),
                        AccountMeta::new_readonly(*authority, true),
                        AccountMeta::new(proposal_transaction, false),
                        AccountMeta::new(*payer, true),
                        AccountMeta::new_readonly(system_program::id(), false),
                        AccountMeta::new_readonly(sysvar::rent::id(), false),
                    ],
                    data,
                }
            }

            Self::SignOffProposal {
                realm,
                governance,
                proposal,
                signatory,
                signatory_record,
                token_owner_record,
            } => {
                let mut accounts = vec![
                    AccountMeta::new_readonly(*realm, false),
                    AccountMeta::new_readonly(*governance, false),
                    AccountMeta::new(*proposal, false),
                    AccountMeta::new_readonly(*signatory, true),
                ];
                match signatory_record {
                    Some(record) => accounts.push(AccountMeta::new(*record, false)),
                    None => accounts.push(AccountMeta::new_readonly(*token_owner_record, false)),
                }
                Instruction {
                    program_id: *program_id,
                    accounts,
                    data: vec![SIGN_OFF_PROPOSAL_TAG],
                }
            }

            Self::PayloadTransfer {
                kind,
                source,
                destination,
                amount,
            } => match kind {
                AssetKind::Native => system_instruction::transfer(source, destination, *amount),
                AssetKind::Token { owner, .. } => spl_token::instruction::transfer(
                    &spl_token::id(),
                    source,
                    destination,
                    owner,
                    &[],
                    *amount,
                )
                .map_err(|e| PipelineError::Encoding(e.to_string()))?,
            },
        };
        Ok(InstructionUnit::new(instruction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(payload: Vec<InstructionUnit>) -> GovernanceInstruction {
        GovernanceInstruction::InsertTransaction {
            governance: Pubkey::new_unique(),
            proposal: Pubkey::new_unique(),
            token_owner_record: Pubkey::new_unique(),
            authority: Pubkey::new_unique(),
            payer: Pubkey::new_unique(),
            option_index: 0,
            index: 3,
            hold_up_time: 86_400,
            payload,
        }
    }

    #[test]
    fn test_create_proposal_encoding() {
        let program = Pubkey::new_unique();
        let authority = Pubkey::new_unique();
        let ix = GovernanceInstruction::CreateProposal {
            realm: Pubkey::new_unique(),
            governance: Pubkey::new_unique(),
            token_owner_record: Pubkey::new_unique(),
            governing_token_mint: Pubkey::new_unique(),
            authority,
            payer: authority,
            proposal_index: 0,
            name: "ab".into(),
            description_link: "".into(),
            vote_type: VoteType::SingleChoice,
            options: vec!["Approve".into()],
            use_deny_option: true,
        }
        .to_unit(&program)
        .unwrap();

        let mut expected = vec![CREATE_PROPOSAL_TAG];
        expected.extend_from_slice(&2u32.to_le_bytes());
        expected.extend_from_slice(b"ab");
        expected.extend_from_slice(&0u32.to_le_bytes());
        expected.push(0); // SingleChoice
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.extend_from_slice(&7u32.to_le_bytes());
        expected.extend_from_slice(b"Approve");
        expected.push(1);

        assert_eq!(ix.data(), expected.as_slice());
        assert_eq!(ix.program_id(), &program);
        assert_eq!(ix.accounts().len(), 9);
        assert_eq!(ix.required_signers().collect::<Vec<_>>(), vec![&authority, &authority]);
    }

    #[test]
    fn test_add_signatory_embeds_signatory_key() {
        let program = Pubkey::new_unique();
        let proposal = Pubkey::new_unique();
        let signatory = Pubkey::new_unique();
        let ix = GovernanceInstruction::AddSignatory {
            proposal,
            token_owner_record: Pubkey::new_unique(),
            authority: Pubkey::new_unique(),
            signatory,
            payer: Pubkey::new_unique(),
        }
        .to_unit(&program)
        .unwrap();

        assert_eq!(ix.data()[0], ADD_SIGNATORY_TAG);
        assert_eq!(&ix.data()[1..], signatory.as_ref());
        assert_eq!(
            ix.accounts()[3].pubkey,
            pda::signatory_record_address(&program, &proposal, &signatory)
        );
    }

    #[test]
    fn test_insert_transaction_embeds_payload() {
        let from = Pubkey::new_unique();
        let payload: InstructionUnit =
            system_instruction::transfer(&from, &Pubkey::new_unique(), 300_000_000).into();
        let ix = insert(vec![payload.clone()]).to_unit(&Pubkey::new_unique()).unwrap();

        let data = ix.data();
        assert_eq!(data[0], INSERT_TRANSACTION_TAG);
        assert_eq!(data[1], 0);
        assert_eq!(&data[2..4], &3u16.to_le_bytes());
        assert_eq!(&data[4..8], &86_400u32.to_le_bytes());
        assert_eq!(&data[8..12], &1u32.to_le_bytes());
        assert_eq!(&data[12..44], system_program::id().as_ref());
        // account count, then the source account with its flags
        assert_eq!(&data[44..48], &2u32.to_le_bytes());
        assert_eq!(&data[48..80], from.as_ref());
        assert_eq!(&data[80..82], &[1, 1]);
        assert!(data.ends_with(payload.data()));
    }

    #[test]
    fn test_insert_transaction_rejects_empty_payload() {
        let err = insert(vec![]).to_unit(&Pubkey::new_unique()).unwrap_err();
        assert_eq!(err, PipelineError::EmptyPayload);
    }

    #[test]
    fn test_sign_off_falls_back_to_token_owner_record() {
        let tor = Pubkey::new_unique();
        let ix = GovernanceInstruction::SignOffProposal {
            realm: Pubkey::new_unique(),
            governance: Pubkey::new_unique(),
            proposal: Pubkey::new_unique(),
            signatory: Pubkey::new_unique(),
            signatory_record: None,
            token_owner_record: tor,
        }
        .to_unit(&Pubkey::new_unique())
        .unwrap();

        assert_eq!(ix.data(), &[SIGN_OFF_PROPOSAL_TAG]);
        let last = ix.accounts().last().unwrap();
        assert_eq!(last.pubkey, tor);
        assert!(!last.is_writable);
    }

    #[test]
    fn test_token_payload_transfer_uses_owner_as_authority() {
        let owner = Pubkey::new_unique();
        let ix = GovernanceInstruction::PayloadTransfer {
            kind: AssetKind::Token {
                mint: Pubkey::new_unique(),
                owner,
            },
            source: Pubkey::new_unique(),
            destination: Pubkey::new_unique(),
            amount: 5,
        }
        .to_unit(&Pubkey::new_unique())
        .unwrap();

        assert_eq!(ix.program_id(), &spl_token::id());
        assert_eq!(ix.required_signers().collect::<Vec<_>>(), vec![&owner]);
    }
}
