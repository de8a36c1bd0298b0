//! Transaction envelopes: compile, size-check and sign a batch
//!
//! The fee payer is always the first account key. Signing happens in two
//! steps: the wallet signs first, then every extra key in the batch's signer
//! set, each at the slot the compiled message assigns to it.

use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::{Message, VersionedMessage},
    packet::PACKET_DATA_SIZE,
    pubkey::Pubkey,
    signature::{Signature, Signer},
    transaction::VersionedTransaction,
};
use tracing::debug;

use crate::submission::{SigningFailure, SubmissionError};
use crate::tx_builder::instructions::{InstructionUnit, SignerSet};
use crate::wallet::WalletSigner;

/// Default ceiling on instructions per transaction
pub const DEFAULT_MAX_INSTRUCTIONS: usize = 64;

/// Fixed limits of the target transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportLimits {
    /// Maximum serialized transaction size in bytes
    pub max_transaction_bytes: usize,
    /// Maximum number of instructions per transaction
    pub max_instructions: usize,
}

impl Default for TransportLimits {
    fn default() -> Self {
        Self {
            max_transaction_bytes: PACKET_DATA_SIZE,
            max_instructions: DEFAULT_MAX_INSTRUCTIONS,
        }
    }
}

fn compile(instructions: &[InstructionUnit], payer: &Pubkey, checkpoint: &Hash) -> VersionedMessage {
    let raw: Vec<Instruction> = instructions
        .iter()
        .map(|ix| ix.as_instruction().clone())
        .collect();
    VersionedMessage::Legacy(Message::new_with_blockhash(&raw, Some(payer), checkpoint))
}

fn placeholder_size(message: &VersionedMessage) -> Result<usize, bincode::Error> {
    let signature_count = message.header().num_required_signatures as usize;
    let tx = VersionedTransaction {
        signatures: vec![Signature::default(); signature_count],
        message: message.clone(),
    };
    bincode::serialized_size(&tx).map(|size| size as usize)
}

/// Serialized size of a fully signed transaction carrying `instructions`
///
/// Signatures and checkpoint are fixed-width, so placeholders give the exact
/// on-wire size.
pub fn encoded_size(instructions: &[InstructionUnit], payer: &Pubkey) -> Result<usize, bincode::Error> {
    placeholder_size(&compile(instructions, payer, &Hash::default()))
}

/// A compiled, size-checked, not yet signed transaction
#[derive(Debug, Clone)]
pub struct TransactionEnvelope {
    message: VersionedMessage,
    encoded_len: usize,
}

impl TransactionEnvelope {
    /// Compile a batch against a checkpoint (`Pending → Built`)
    pub fn build(
        instructions: &[InstructionUnit],
        payer: &Pubkey,
        checkpoint: Hash,
        limits: &TransportLimits,
    ) -> Result<Self, SubmissionError> {
        if instructions.is_empty() {
            return Err(SubmissionError::empty_batch());
        }
        if instructions.len() > limits.max_instructions {
            return Err(SubmissionError::too_many_instructions(
                instructions.len(),
                limits.max_instructions,
            ));
        }

        let message = compile(instructions, payer, &checkpoint);
        let encoded_len = placeholder_size(&message)
            .map_err(|e| SubmissionError::Build(format!("encoding failed: {}", e)))?;
        if encoded_len > limits.max_transaction_bytes {
            return Err(SubmissionError::oversized(
                encoded_len,
                limits.max_transaction_bytes,
            ));
        }

        Ok(Self {
            message,
            encoded_len,
        })
    }

    pub fn fee_payer(&self) -> &Pubkey {
        // Compiled with Some(payer), so key 0 always exists
        &self.message.static_account_keys()[0]
    }

    /// Keys whose signatures the message requires, fee payer first
    pub fn required_signers(&self) -> &[Pubkey] {
        let count = self.message.header().num_required_signatures as usize;
        &self.message.static_account_keys()[..count]
    }

    pub fn checkpoint(&self) -> &Hash {
        self.message.recent_blockhash()
    }

    pub fn encoded_len(&self) -> usize {
        self.encoded_len
    }

    /// Sign with the wallet, then the batch signers (`Built → Signed`)
    ///
    /// Missing signers are detected before the wallet is asked, so the user
    /// is never prompted for a transaction that cannot be completed.
    pub async fn sign<W: WalletSigner + ?Sized>(
        self,
        wallet: &W,
        signers: &SignerSet,
    ) -> Result<VersionedTransaction, SubmissionError> {
        let fee_payer = *self.fee_payer();
        let wallet_key = wallet.pubkey();
        if wallet_key != fee_payer {
            return Err(SigningFailure::PayerMismatch {
                wallet: wallet_key,
                fee_payer,
            }
            .into());
        }

        let required = self.required_signers().to_vec();
        if let Some(missing) = required
            .iter()
            .skip(1)
            .find(|key| !signers.contains(key))
        {
            return Err(SubmissionError::missing_signer(*missing));
        }

        let message_bytes = self.message.serialize();
        let mut signatures = Vec::with_capacity(required.len());

        let wallet_signature = wallet
            .sign_message(&message_bytes)
            .await
            .map_err(|e| SigningFailure::Rejected(e.to_string()))?;
        signatures.push(wallet_signature);

        for key in required.iter().skip(1) {
            let keypair = signers
                .get(key)
                .ok_or_else(|| SubmissionError::missing_signer(*key))?;
            signatures.push(keypair.sign_message(&message_bytes));
        }

        let unused = signers
            .pubkeys()
            .iter()
            .filter(|key| !required.contains(key))
            .count();
        if unused > 0 {
            debug!(unused, "Signer set carries keys the message does not require");
        }

        Ok(VersionedTransaction {
            signatures,
            message: self.message,
        })
    }
}
