//! Instruction units, signer sets and instruction batches
//!
//! An [`InstructionUnit`] is an immutable chain instruction. Batches own their
//! units; once a unit is placed into a batch it is only read, never edited.

use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::fmt;
use std::sync::Arc;

/// A single chain instruction plus the account keys it touches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionUnit {
    inner: Instruction,
}

impl InstructionUnit {
    /// Wrap a raw instruction
    pub fn new(instruction: Instruction) -> Self {
        Self { inner: instruction }
    }

    /// Program this instruction targets
    pub fn program_id(&self) -> &Pubkey {
        &self.inner.program_id
    }

    /// Accounts read or written, in instruction order
    pub fn accounts(&self) -> &[AccountMeta] {
        &self.inner.accounts
    }

    /// Opaque instruction payload
    pub fn data(&self) -> &[u8] {
        &self.inner.data
    }

    /// Accounts the instruction marks as required signers
    pub fn required_signers(&self) -> impl Iterator<Item = &Pubkey> {
        self.inner
            .accounts
            .iter()
            .filter(|meta| meta.is_signer)
            .map(|meta| &meta.pubkey)
    }

    /// Borrow the underlying instruction
    pub fn as_instruction(&self) -> &Instruction {
        &self.inner
    }

    /// Unwrap into the underlying instruction
    pub fn into_instruction(self) -> Instruction {
        self.inner
    }
}

impl From<Instruction> for InstructionUnit {
    fn from(instruction: Instruction) -> Self {
        Self::new(instruction)
    }
}

/// Ordered set of keys that authorise a batch, beyond the fee payer
///
/// The wallet (fee payer) is implicit and never stored here. Insertion order is
/// kept; inserting a key that is already present is a no-op.
#[derive(Clone, Default)]
pub struct SignerSet {
    keys: Vec<Arc<Keypair>>,
}

impl SignerSet {
    /// Empty signer set (fee payer only)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a signer, skipping duplicates
    pub fn insert(&mut self, keypair: Arc<Keypair>) {
        let pubkey = keypair.pubkey();
        if !self.contains(&pubkey) {
            self.keys.push(keypair);
        }
    }

    /// Builder-style variant of [`SignerSet::insert`]
    pub fn with(mut self, keypair: Arc<Keypair>) -> Self {
        self.insert(keypair);
        self
    }

    /// Merge another set into this one, preserving order
    pub fn extend(&mut self, other: &SignerSet) {
        for key in &other.keys {
            self.insert(Arc::clone(key));
        }
    }

    pub fn contains(&self, pubkey: &Pubkey) -> bool {
        self.keys.iter().any(|k| k.pubkey() == *pubkey)
    }

    /// Find the keypair for a public key
    pub fn get(&self, pubkey: &Pubkey) -> Option<&Keypair> {
        self.keys
            .iter()
            .find(|k| k.pubkey() == *pubkey)
            .map(|k| k.as_ref())
    }

    pub fn pubkeys(&self) -> Vec<Pubkey> {
        self.keys.iter().map(|k| k.pubkey()).collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<Arc<Keypair>> for SignerSet {
    fn from_iter<I: IntoIterator<Item = Arc<Keypair>>>(iter: I) -> Self {
        let mut set = SignerSet::new();
        for key in iter {
            set.insert(key);
        }
        set
    }
}

impl fmt::Debug for SignerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material
        f.debug_list().entries(self.pubkeys()).finish()
    }
}

/// Instructions destined for one signed transaction, plus their extra signers
#[derive(Debug, Clone)]
pub struct InstructionBatch {
    instructions: Vec<InstructionUnit>,
    signers: SignerSet,
}

impl InstructionBatch {
    pub fn new(instructions: Vec<InstructionUnit>, signers: SignerSet) -> Self {
        Self {
            instructions,
            signers,
        }
    }

    /// Batch signed by the fee payer alone
    pub fn unsigned(instructions: Vec<InstructionUnit>) -> Self {
        Self::new(instructions, SignerSet::new())
    }

    pub fn instructions(&self) -> &[InstructionUnit] {
        &self.instructions
    }

    pub fn signers(&self) -> &SignerSet {
        &self.signers
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Required signers that are neither the fee payer nor in the signer set
    pub fn missing_signers(&self, fee_payer: &Pubkey) -> Vec<Pubkey> {
        let mut missing = Vec::new();
        for key in self.instructions.iter().flat_map(|ix| ix.required_signers()) {
            if key != fee_payer && !self.signers.contains(key) && !missing.contains(key) {
                missing.push(*key);
            }
        }
        missing
    }

    pub fn into_parts(self) -> (Vec<InstructionUnit>, SignerSet) {
        (self.instructions, self.signers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::system_instruction;

    #[test]
    fn test_signer_set_dedup_and_order() {
        let a = Arc::new(Keypair::new());
        let b = Arc::new(Keypair::new());

        let set = SignerSet::new()
            .with(Arc::clone(&a))
            .with(Arc::clone(&b))
            .with(Arc::clone(&a));

        assert_eq!(set.len(), 2);
        assert_eq!(set.pubkeys(), vec![a.pubkey(), b.pubkey()]);
        assert!(set.get(&b.pubkey()).is_some());
    }

    #[test]
    fn test_missing_signers_excludes_fee_payer() {
        let payer = Pubkey::new_unique();
        let new_account = Keypair::new();
        let ix = system_instruction::create_account(
            &payer,
            &new_account.pubkey(),
            1_000_000,
            82,
            &spl_token::id(),
        );

        let batch = InstructionBatch::unsigned(vec![ix.clone().into()]);
        assert_eq!(batch.missing_signers(&payer), vec![new_account.pubkey()]);

        let signed = InstructionBatch::new(
            vec![ix.into()],
            SignerSet::new().with(Arc::new(new_account)),
        );
        assert!(signed.missing_signers(&payer).is_empty());
    }

    #[test]
    fn test_signer_set_debug_prints_pubkeys_only() {
        let key = Arc::new(Keypair::new());
        let set = SignerSet::new().with(Arc::clone(&key));
        let printed = format!("{:?}", set);
        assert!(printed.contains(&key.pubkey().to_string()));
    }
}
