//! Structured logging for batch state transitions
//!
//! One event per transition, every event carrying the run's correlation id
//! and the batch index so a single run can be filtered out of busy logs.

use solana_sdk::{hash::Hash, signature::Signature};

use crate::observability::CorrelationId;
use crate::submission::SubmissionError;
use crate::tx_builder::SequencePolicy;

/// Structured logger for one submission run
#[derive(Debug, Clone)]
pub struct SubmissionLogger {
    correlation_id: CorrelationId,
}

impl SubmissionLogger {
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self { correlation_id }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn log_run_started(&self, batches: usize, phases: usize) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            batches,
            phases,
            "Submission run started"
        );
    }

    pub fn log_phase_started(&self, phase: usize, policy: SequencePolicy, batches: usize) {
        tracing::debug!(
            correlation_id = %self.correlation_id,
            phase,
            policy = %policy,
            batches,
            "Phase started"
        );
    }

    pub fn log_built(&self, index: usize, checkpoint: &Hash, encoded_len: usize) {
        tracing::debug!(
            correlation_id = %self.correlation_id,
            batch = index,
            checkpoint = %checkpoint,
            encoded_len,
            "Batch built"
        );
    }

    pub fn log_signed(&self, index: usize, signatures: usize) {
        tracing::debug!(
            correlation_id = %self.correlation_id,
            batch = index,
            signatures,
            "Batch signed"
        );
    }

    pub fn log_sent(&self, index: usize, signature: &Signature) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            batch = index,
            signature = %signature,
            "Batch sent"
        );
    }

    pub fn log_confirmed(&self, index: usize, signature: &Signature, latency_ms: u64) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            batch = index,
            signature = %signature,
            latency_ms,
            "Batch confirmed"
        );
    }

    pub fn log_failed(&self, index: usize, signature: Option<&Signature>, error: &SubmissionError) {
        tracing::warn!(
            correlation_id = %self.correlation_id,
            batch = index,
            signature = ?signature,
            category = error.category(),
            error = %error,
            "Batch failed"
        );
    }

    pub fn log_skipped(&self, index: usize, reason: &str) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            batch = index,
            reason,
            "Batch skipped"
        );
    }

    pub fn log_run_finished(&self, confirmed: usize, total: usize, success: bool) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            confirmed,
            total,
            success,
            "Submission run finished"
        );
    }
}
