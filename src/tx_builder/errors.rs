//! Error types for batch assembly
//!
//! These errors are raised before anything touches the network: they signal
//! caller bugs in how instruction lists were chunked or packed.

use thiserror::Error;

/// Errors raised by the batch builder and sequence planner
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// Chunk size must be at least one instruction
    #[error("Invalid chunk size: {0} (must be >= 1)")]
    InvalidChunkSize(usize),

    /// A single instruction does not fit into a transaction on its own
    ///
    /// Splitting cannot help here; the instruction itself has to change.
    #[error("Instruction {index} encodes to {size} bytes alone (limit {limit})")]
    InstructionTooLarge {
        /// Position of the instruction in the input list
        index: usize,
        /// Encoded size of a transaction carrying only this instruction
        size: usize,
        /// Transport limit in bytes
        limit: usize,
    },

    /// Signer sets and chunk lists were supplied with different lengths
    #[error("Signer set count mismatch: {chunks} chunks, {signer_sets} signer sets")]
    SignerSetMismatch {
        /// Number of instruction chunks
        chunks: usize,
        /// Number of signer sets
        signer_sets: usize,
    },

    /// Encoding failure while estimating transaction size
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl BatchError {
    /// Batch errors are caller bugs; none of them go away on retry
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidChunkSize(_) => "chunk_size",
            Self::InstructionTooLarge { .. } => "oversized",
            Self::SignerSetMismatch { .. } => "signers",
            Self::Encoding(_) => "encoding",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BatchError::InvalidChunkSize(0);
        assert_eq!(err.to_string(), "Invalid chunk size: 0 (must be >= 1)");

        let err = BatchError::InstructionTooLarge {
            index: 3,
            size: 1500,
            limit: 1232,
        };
        assert_eq!(
            err.to_string(),
            "Instruction 3 encodes to 1500 bytes alone (limit 1232)"
        );
    }

    #[test]
    fn test_never_retryable() {
        assert!(!BatchError::InvalidChunkSize(0).is_retryable());
        assert!(!BatchError::Encoding("x".into()).is_retryable());
    }
}
