//! Submission engine
//!
//! Drives every `TypedInstructionBatch` through
//! `Pending → Built → Signed → Sent → Confirmed | Failed`, phase by phase:
//!
//! - Sequential / StopOnFailure runs: one batch at a time, each confirmed
//!   before the next is built; the first failure skips the rest of the run.
//!   A run is the maximal contiguous span of one policy, so back-to-back
//!   `plan` calls with the same policy share one abort chain
//! - Parallel runs: every batch is built, signed and sent before any
//!   confirmation is awaited; failures do not cancel siblings
//! - Signing is serialized through one gate regardless of phase policy
//!
//! The engine never resubmits. A caller retrying a failed batch rebuilds it
//! from `Pending` so it picks up a fresh checkpoint.

use chrono::Utc;
use futures::future::join_all;
use solana_sdk::signature::Signature;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::metrics::{Metrics, Timer};
use crate::observability::CorrelationId;
use crate::structured_logging::SubmissionLogger;
use crate::submission::errors::SubmissionError;
use crate::submission::outcome::{BatchOutcome, SubmissionReport, SubmissionResult};
use crate::submission::transport::{ChainTransport, SignatureState};
use crate::tx_builder::{
    into_phases, InstructionBatch, TransactionEnvelope, TransportLimits, TypedInstructionBatch,
};
use crate::wallet::WalletSigner;

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on waiting for one sent batch to confirm
    pub confirm_timeout: Duration,
    pub poll_interval: Duration,
    /// Simulate every signed transaction before sending it
    pub simulate_before_send: bool,
    pub limits: TransportLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confirm_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
            simulate_before_send: true,
            limits: TransportLimits::default(),
        }
    }
}

/// Cancels a run before its remaining batches are sent
///
/// Batches already sent are still awaited; the network cannot withdraw them.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A batch that reached `Sent`
struct SentBatch {
    index: usize,
    signature: Signature,
    sent_at: Instant,
}

enum Dispatch {
    Sent(SentBatch),
    /// Terminal before send: failed or skipped
    Done(SubmissionResult),
}

/// Submits typed batches to one transport, signing with one wallet
pub struct SubmissionEngine<T: ?Sized, W: ?Sized> {
    transport: Arc<T>,
    wallet: Arc<W>,
    config: EngineConfig,
    signing_gate: Mutex<()>,
    metrics: Option<Arc<Metrics>>,
    cancel: CancelHandle,
}

impl<T, W> SubmissionEngine<T, W>
where
    T: ChainTransport + ?Sized,
    W: WalletSigner + ?Sized,
{
    pub fn new(transport: Arc<T>, wallet: Arc<W>, config: EngineConfig) -> Self {
        Self {
            transport,
            wallet,
            config,
            signing_gate: Mutex::new(()),
            metrics: None,
            cancel: CancelHandle::default(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Handle that cancels whatever this engine has not yet sent
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the schedule left to right and collect one result per batch
    ///
    /// Never fails as a whole: every batch ends `Confirmed`, `Failed` or
    /// `Skipped`, and the report preserves submission order.
    pub async fn submit(&self, batches: Vec<TypedInstructionBatch>) -> SubmissionReport {
        let started_at = Utc::now();
        let logger = SubmissionLogger::new(CorrelationId::new());
        let total = batches.len();

        let phases = into_phases(batches);
        logger.log_run_started(total, phases.len());

        let mut results = Vec::with_capacity(total);
        for (n, phase) in phases.into_iter().enumerate() {
            logger.log_phase_started(n, phase.policy, phase.batches.len());
            let phase_results = if phase.policy.aborts_on_failure() {
                self.run_sequential(phase.batches, &logger).await
            } else {
                self.run_parallel(phase.batches, &logger).await
            };
            results.extend(phase_results);
        }

        let report = SubmissionReport {
            results,
            started_at,
            finished_at: Utc::now(),
        };
        logger.log_run_finished(report.confirmed_count(), total, report.success());
        report
    }

    async fn run_sequential(
        &self,
        batches: Vec<(usize, TypedInstructionBatch)>,
        logger: &SubmissionLogger,
    ) -> Vec<SubmissionResult> {
        let mut results = Vec::with_capacity(batches.len());
        let mut aborted = false;

        for (index, typed) in batches {
            if aborted {
                results.push(self.skip(index, "earlier batch in run did not confirm", logger));
                continue;
            }
            let result = match self.dispatch(index, typed.into_batch(), logger).await {
                Dispatch::Sent(sent) => self.confirm(sent, logger).await,
                Dispatch::Done(result) => result,
            };
            aborted = !result.outcome.is_confirmed();
            results.push(result);
        }
        results
    }

    async fn run_parallel(
        &self,
        batches: Vec<(usize, TypedInstructionBatch)>,
        logger: &SubmissionLogger,
    ) -> Vec<SubmissionResult> {
        let dispatched = join_all(
            batches
                .into_iter()
                .map(|(index, typed)| self.dispatch(index, typed.into_batch(), logger)),
        )
        .await;

        let mut results = Vec::with_capacity(dispatched.len());
        let mut in_flight = Vec::new();
        for dispatch in dispatched {
            match dispatch {
                Dispatch::Sent(sent) => in_flight.push(sent),
                Dispatch::Done(result) => results.push(result),
            }
        }

        results.extend(join_all(in_flight.into_iter().map(|sent| self.confirm(sent, logger))).await);
        results.sort_by_key(|r| r.index);
        results
    }

    /// `Pending → Built → Signed → Sent`
    async fn dispatch(
        &self,
        index: usize,
        batch: InstructionBatch,
        logger: &SubmissionLogger,
    ) -> Dispatch {
        if self.cancel.is_cancelled() {
            return Dispatch::Done(self.skip(index, "cancelled", logger));
        }
        let (instructions, signers) = batch.into_parts();

        let timer = Timer::new();
        let checkpoint = match self.transport.latest_checkpoint().await {
            Ok(hash) => hash,
            Err(err) => return Dispatch::Done(self.fail(index, None, err.into(), logger)),
        };
        let envelope = match TransactionEnvelope::build(
            &instructions,
            &self.wallet.pubkey(),
            checkpoint,
            &self.config.limits,
        ) {
            Ok(envelope) => envelope,
            Err(err) => return Dispatch::Done(self.fail(index, None, err, logger)),
        };
        if let Some(metrics) = &self.metrics {
            timer.observe_duration(&metrics.build_latency);
        }
        logger.log_built(index, envelope.checkpoint(), envelope.encoded_len());

        let signed = {
            let _gate = self.signing_gate.lock().await;
            envelope.sign(self.wallet.as_ref(), &signers).await
        };
        let tx = match signed {
            Ok(tx) => tx,
            Err(err) => return Dispatch::Done(self.fail(index, None, err, logger)),
        };
        logger.log_signed(index, tx.signatures.len());

        if self.config.simulate_before_send {
            match self.transport.simulate(&tx).await {
                Ok(report) => {
                    if let Some(reason) = report.err {
                        let err = SubmissionError::SimulationRejected {
                            reason,
                            logs: report.logs,
                        };
                        return Dispatch::Done(self.fail(index, None, err, logger));
                    }
                }
                Err(err) => return Dispatch::Done(self.fail(index, None, err.into(), logger)),
            }
        }

        // Last point at which nothing has reached the network
        if self.cancel.is_cancelled() {
            return Dispatch::Done(self.skip(index, "cancelled", logger));
        }

        match self.transport.send_raw(&tx).await {
            Ok(signature) => {
                if let Some(metrics) = &self.metrics {
                    metrics.batches_submitted.inc();
                }
                logger.log_sent(index, &signature);
                Dispatch::Sent(SentBatch {
                    index,
                    signature,
                    sent_at: Instant::now(),
                })
            }
            Err(err) => Dispatch::Done(self.fail(index, None, err.into(), logger)),
        }
    }

    /// `Sent → Confirmed | Failed`
    async fn confirm(&self, sent: SentBatch, logger: &SubmissionLogger) -> SubmissionResult {
        let SentBatch {
            index,
            signature,
            sent_at,
        } = sent;
        let deadline = sent_at + self.config.confirm_timeout;

        loop {
            match self.transport.signature_state(&signature).await {
                Ok(Some(SignatureState::Confirmed)) => {
                    let latency = sent_at.elapsed();
                    if let Some(metrics) = &self.metrics {
                        metrics.batches_confirmed.inc();
                        metrics.confirmation_latency.observe(latency.as_secs_f64());
                    }
                    logger.log_confirmed(index, &signature, latency.as_millis() as u64);
                    return SubmissionResult {
                        index,
                        signature: Some(signature),
                        outcome: BatchOutcome::Confirmed,
                    };
                }
                Ok(Some(SignatureState::Failed { code, detail })) => {
                    let err = SubmissionError::chain(code, detail);
                    return self.fail(index, Some(signature), err, logger);
                }
                Ok(Some(SignatureState::Processing)) | Ok(None) => {}
                Err(err) => {
                    // A failed poll says nothing about the transaction itself
                    debug!(batch = index, error = %err, "Status poll failed");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                let err = SubmissionError::Timeout {
                    signature,
                    waited: now.duration_since(sent_at),
                };
                return self.fail(index, Some(signature), err, logger);
            }
            sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }

    fn fail(
        &self,
        index: usize,
        signature: Option<Signature>,
        err: SubmissionError,
        logger: &SubmissionLogger,
    ) -> SubmissionResult {
        if let Some(metrics) = &self.metrics {
            metrics.record_failure(err.category());
        }
        logger.log_failed(index, signature.as_ref(), &err);
        SubmissionResult::failed(index, signature, err)
    }

    fn skip(&self, index: usize, reason: &str, logger: &SubmissionLogger) -> SubmissionResult {
        if let Some(metrics) = &self.metrics {
            metrics.batches_skipped.inc();
        }
        logger.log_skipped(index, reason);
        SubmissionResult::skipped(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{marker_instruction, MockTransport, MockWallet, Rule};
    use crate::tx_builder::{plan, InstructionUnit, SequencePolicy, SignerSet};
    use solana_sdk::signature::{Keypair, Signer};

    fn marked(tags: &[u8]) -> Vec<InstructionBatch> {
        tags.iter()
            .map(|tag| InstructionBatch::unsigned(vec![marker_instruction(*tag)]))
            .collect()
    }

    fn engine(transport: Arc<MockTransport>) -> SubmissionEngine<MockTransport, MockWallet> {
        SubmissionEngine::new(transport, Arc::new(MockWallet::new()), EngineConfig::default())
    }

    #[tokio::test]
    async fn test_sequential_run_confirms_in_order() {
        let transport = Arc::new(MockTransport::new());
        let report = engine(Arc::clone(&transport))
            .submit(plan(marked(&[1, 2, 3]), SequencePolicy::Sequential))
            .await;

        assert!(report.success());
        assert_eq!(report.signatures().len(), 3);
        assert_eq!(transport.sent_markers(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_sequential_failure_skips_rest_of_run() {
        let transport = Arc::new(MockTransport::new().with_rule(2, Rule::FailOnChain(Some(1))));
        let report = engine(Arc::clone(&transport))
            .submit(plan(marked(&[1, 2, 3, 4]), SequencePolicy::StopOnFailure))
            .await;

        let outcomes = report.outcomes();
        assert!(outcomes[0].is_confirmed());
        assert!(matches!(
            outcomes[1],
            BatchOutcome::Failed(SubmissionError::Chain { code: Some(1), .. })
        ));
        assert_eq!(outcomes[2], &BatchOutcome::Skipped);
        assert_eq!(outcomes[3], &BatchOutcome::Skipped);
        assert_eq!(transport.sent_markers(), vec![1, 2]);
        assert!(!report.success());
    }

    #[tokio::test]
    async fn test_adjacent_sequential_groups_form_one_run() {
        let transport = Arc::new(MockTransport::new().with_rule(1, Rule::FailSend));
        let mut schedule = plan(marked(&[1]), SequencePolicy::Sequential);
        schedule.extend(plan(marked(&[2]), SequencePolicy::Sequential));
        schedule.extend(plan(marked(&[3]), SequencePolicy::Parallel));

        let report = engine(Arc::clone(&transport)).submit(schedule).await;
        let outcomes = report.outcomes();
        assert!(outcomes[0].is_failed());
        assert_eq!(outcomes[1], &BatchOutcome::Skipped);
        assert!(outcomes[2].is_confirmed());
        assert_eq!(transport.sent_markers(), vec![3]);
    }

    #[tokio::test]
    async fn test_failure_does_not_skip_next_phase() {
        let transport = Arc::new(MockTransport::new().with_rule(1, Rule::FailSend));
        let mut schedule = plan(marked(&[1]), SequencePolicy::Sequential);
        schedule.extend(plan(marked(&[2]), SequencePolicy::StopOnFailure));
        schedule.extend(plan(marked(&[3]), SequencePolicy::Parallel));

        let report = engine(transport).submit(schedule).await;
        let outcomes = report.outcomes();
        assert!(outcomes[0].is_failed());
        assert!(outcomes[1].is_confirmed());
        assert!(outcomes[2].is_confirmed());
    }

    #[tokio::test]
    async fn test_parallel_signing_is_serialized() {
        let transport = Arc::new(MockTransport::new());
        let wallet = Arc::new(MockWallet::new().with_sign_delay(Duration::from_millis(5)));
        let engine = SubmissionEngine::new(transport, Arc::clone(&wallet), EngineConfig::default());

        let report = engine
            .submit(plan(marked(&[1, 2, 3, 4, 5, 6]), SequencePolicy::Parallel))
            .await;

        assert!(report.success());
        assert_eq!(wallet.sign_requests(), 6);
        assert_eq!(wallet.peak_concurrent_signs(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_is_build_error() {
        let transport = Arc::new(MockTransport::new());
        let report = engine(transport)
            .submit(plan(vec![InstructionBatch::unsigned(vec![])], SequencePolicy::Parallel))
            .await;
        assert_eq!(
            report.results[0].outcome,
            BatchOutcome::Failed(SubmissionError::empty_batch())
        );
    }

    #[tokio::test]
    async fn test_simulation_rejection_is_not_sent() {
        let transport = Arc::new(
            MockTransport::new().with_rule(7, Rule::RejectSimulation("custom program error: 0x1".into())),
        );
        let report = engine(Arc::clone(&transport))
            .submit(plan(marked(&[7]), SequencePolicy::Sequential))
            .await;

        assert!(matches!(
            report.results[0].outcome,
            BatchOutcome::Failed(SubmissionError::SimulationRejected { .. })
        ));
        assert_eq!(report.results[0].signature, None);
        assert!(transport.sent_markers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_timeout_keeps_signature() {
        let transport = Arc::new(MockTransport::new().with_rule(5, Rule::NeverConfirm));
        let config = EngineConfig {
            confirm_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            ..EngineConfig::default()
        };
        let engine = SubmissionEngine::new(transport, Arc::new(MockWallet::new()), config);

        let report = engine
            .submit(plan(marked(&[5]), SequencePolicy::Sequential))
            .await;
        let result = &report.results[0];
        assert!(result.signature.is_some());
        let err = result.outcome.error().unwrap();
        assert!(err.requires_chain_requery());
        match err {
            SubmissionError::Timeout { waited, .. } => {
                assert!(*waited >= Duration::from_secs(10))
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_signer_never_prompts_wallet() {
        let transport = Arc::new(MockTransport::new());
        let wallet = Arc::new(MockWallet::new());
        let engine = SubmissionEngine::new(
            Arc::clone(&transport),
            Arc::clone(&wallet),
            EngineConfig::default(),
        );

        let extra = Keypair::new();
        let unit: InstructionUnit = solana_sdk::system_instruction::create_account(
            &wallet.pubkey(),
            &extra.pubkey(),
            1,
            0,
            &solana_sdk::system_program::id(),
        )
        .into();
        let batch = InstructionBatch::new(vec![unit], SignerSet::new());

        let report = engine.submit(plan(vec![batch], SequencePolicy::Sequential)).await;
        assert_eq!(
            report.results[0].outcome,
            BatchOutcome::Failed(SubmissionError::missing_signer(extra.pubkey()))
        );
        assert_eq!(wallet.sign_requests(), 0);
    }

    #[tokio::test]
    async fn test_cancel_before_run_skips_everything() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine(Arc::clone(&transport));
        engine.cancel_handle().cancel();

        let report = engine
            .submit(plan(marked(&[1, 2]), SequencePolicy::Parallel))
            .await;
        assert_eq!(report.skipped_count(), 2);
        assert!(transport.sent_markers().is_empty());
    }

    #[tokio::test]
    async fn test_metrics_track_outcomes() {
        let transport = Arc::new(MockTransport::new().with_rule(2, Rule::FailOnChain(None)));
        let metrics = Arc::new(Metrics::new().unwrap());
        let engine = engine(transport).with_metrics(Arc::clone(&metrics));

        engine
            .submit(plan(marked(&[1, 2, 3]), SequencePolicy::Sequential))
            .await;
        assert_eq!(metrics.batches_submitted.get(), 2);
        assert_eq!(metrics.batches_confirmed.get(), 1);
        assert_eq!(metrics.failures("chain"), 1);
        assert_eq!(metrics.batches_skipped.get(), 1);
    }
}
