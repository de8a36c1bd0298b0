//! Batch builder: split flat instruction lists into transaction-sized chunks
//!
//! Chunking never reorders and never drops instructions; concatenating the
//! chunks always reproduces the input. Signers are never inferred from
//! instruction content here, the producer of an instruction knows which keys
//! it needs and supplies them.

use solana_sdk::pubkey::Pubkey;

use crate::tx_builder::envelope::{encoded_size, TransportLimits};
use crate::tx_builder::errors::BatchError;
use crate::tx_builder::instructions::{InstructionBatch, InstructionUnit, SignerSet};

/// Split `items` into contiguous chunks of at most `max_per_chunk` elements
///
/// Empty input yields no chunks (not one empty chunk).
pub fn chunk<T: Clone>(items: &[T], max_per_chunk: usize) -> Result<Vec<Vec<T>>, BatchError> {
    if max_per_chunk == 0 {
        return Err(BatchError::InvalidChunkSize(max_per_chunk));
    }
    Ok(items.chunks(max_per_chunk).map(<[T]>::to_vec).collect())
}

/// Chunk and pair every chunk with an empty signer set
///
/// The bulk case: e.g. minting to many recipients where only the fee payer
/// signs.
pub fn chunk_with_empty_signers(
    instructions: &[InstructionUnit],
    max_per_chunk: usize,
) -> Result<Vec<InstructionBatch>, BatchError> {
    Ok(chunk(instructions, max_per_chunk)?
        .into_iter()
        .map(InstructionBatch::unsigned)
        .collect())
}

/// Pair hand-authored instruction lists with their explicit signer sets
pub fn pair_with_signers(
    chunks: Vec<Vec<InstructionUnit>>,
    signer_sets: Vec<SignerSet>,
) -> Result<Vec<InstructionBatch>, BatchError> {
    if chunks.len() != signer_sets.len() {
        return Err(BatchError::SignerSetMismatch {
            chunks: chunks.len(),
            signer_sets: signer_sets.len(),
        });
    }
    Ok(chunks
        .into_iter()
        .zip(signer_sets)
        .map(|(instructions, signers)| InstructionBatch::new(instructions, signers))
        .collect())
}

/// Greedily pack instructions into chunks that fit the transport limits
///
/// Each chunk is grown until adding the next instruction would exceed either
/// the byte limit or the instruction ceiling. An instruction that does not fit
/// even alone is an error.
pub fn pack_by_size(
    instructions: &[InstructionUnit],
    payer: &Pubkey,
    limits: &TransportLimits,
) -> Result<Vec<Vec<InstructionUnit>>, BatchError> {
    let mut packed: Vec<Vec<InstructionUnit>> = Vec::new();
    let mut current: Vec<InstructionUnit> = Vec::new();

    for (index, ix) in instructions.iter().enumerate() {
        current.push(ix.clone());
        let size = encoded_size(&current, payer).map_err(|e| BatchError::Encoding(e.to_string()))?;
        let fits = size <= limits.max_transaction_bytes && current.len() <= limits.max_instructions;
        if fits {
            continue;
        }

        // Undo and close the chunk, then retry the instruction alone
        current.pop();
        if current.is_empty() {
            return Err(BatchError::InstructionTooLarge {
                index,
                size,
                limit: limits.max_transaction_bytes,
            });
        }
        packed.push(std::mem::take(&mut current));

        current.push(ix.clone());
        let alone = encoded_size(&current, payer).map_err(|e| BatchError::Encoding(e.to_string()))?;
        if alone > limits.max_transaction_bytes {
            return Err(BatchError::InstructionTooLarge {
                index,
                size: alone,
                limit: limits.max_transaction_bytes,
            });
        }
    }

    if !current.is_empty() {
        packed.push(current);
    }
    Ok(packed)
}
