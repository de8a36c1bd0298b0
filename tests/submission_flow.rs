//! End-to-end submission runs against the in-memory transport

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;

use govflow::submission::{
    BatchOutcome, EngineConfig, SigningFailure, SubmissionEngine, SubmissionError,
};
use govflow::test_utils::{marker_instruction, MockEvent, MockTransport, MockWallet, Rule};
use govflow::tx_builder::{
    chunk_with_empty_signers, plan, InstructionBatch, InstructionUnit, SequencePolicy,
};

fn engine(
    transport: &Arc<MockTransport>,
    wallet: Arc<MockWallet>,
) -> SubmissionEngine<MockTransport, MockWallet> {
    let config = EngineConfig {
        confirm_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(10),
        ..EngineConfig::default()
    };
    SubmissionEngine::new(Arc::clone(transport), wallet, config)
}

fn marked(tags: &[u8]) -> Vec<InstructionBatch> {
    tags.iter()
        .map(|tag| InstructionBatch::unsigned(vec![marker_instruction(*tag)]))
        .collect()
}

#[tokio::test]
async fn bulk_mint_is_chunked_and_confirmed_in_order() {
    let wallet = Arc::new(MockWallet::new());
    let mint = Pubkey::new_unique();
    let units: Vec<InstructionUnit> = (0..23)
        .map(|_| {
            spl_token::instruction::mint_to(
                &spl_token::id(),
                &mint,
                &Pubkey::new_unique(),
                &wallet.pubkey(),
                &[],
                1_000,
            )
            .unwrap()
            .into()
        })
        .collect();

    let batches = chunk_with_empty_signers(&units, 10).unwrap();
    let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
    assert_eq!(sizes, vec![10, 10, 3]);

    let transport = Arc::new(MockTransport::new());
    let report = engine(&transport, wallet)
        .submit(plan(batches, SequencePolicy::Sequential))
        .await;

    assert!(report.success());
    assert_eq!(report.confirmed_count(), 3);
    assert_eq!(
        report.results.iter().map(|r| r.index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(transport.sent_count(), 3);
}

#[tokio::test]
async fn parallel_failure_leaves_siblings_confirmed() {
    let transport = Arc::new(MockTransport::new().with_rule(3, Rule::FailOnChain(Some(6000))));
    let report = engine(&transport, Arc::new(MockWallet::new()))
        .submit(plan(marked(&[1, 2, 3, 4, 5]), SequencePolicy::Parallel))
        .await;

    let outcomes = report.outcomes();
    assert_eq!(outcomes.len(), 5);
    for (index, outcome) in outcomes.iter().enumerate() {
        if index == 2 {
            assert!(matches!(
                outcome,
                BatchOutcome::Failed(SubmissionError::Chain { code: Some(6000), .. })
            ));
        } else {
            assert!(outcome.is_confirmed(), "batch {} was {}", index, outcome);
        }
    }
    assert_eq!(report.first_failure().map(|(i, _)| i), Some(2));
}

#[tokio::test]
async fn parallel_run_sends_everything_before_polling() {
    let transport = Arc::new(MockTransport::new().with_rule(2, Rule::ConfirmAfterPolls(2)));
    let report = engine(&transport, Arc::new(MockWallet::new()))
        .submit(plan(marked(&[1, 2, 3, 4]), SequencePolicy::Parallel))
        .await;
    assert!(report.success());

    let events = transport.events();
    let last_sent = events
        .iter()
        .rposition(|e| matches!(e, MockEvent::Sent { .. }))
        .unwrap();
    let first_polled = events
        .iter()
        .position(|e| matches!(e, MockEvent::Polled(_)))
        .unwrap();
    assert!(last_sent < first_polled);
}

#[tokio::test]
async fn sequential_run_confirms_each_batch_before_sending_the_next() {
    let transport = Arc::new(MockTransport::new().with_rule(1, Rule::ConfirmAfterPolls(3)));
    let report = engine(&transport, Arc::new(MockWallet::new()))
        .submit(plan(marked(&[1, 2, 3]), SequencePolicy::Sequential))
        .await;
    assert!(report.success());

    // Between two sends there must be at least one poll of the earlier signature
    let events = transport.events();
    let sends: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, MockEvent::Sent { .. }))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(sends.len(), 3);
    for pair in sends.windows(2) {
        let MockEvent::Sent { signature, .. } = &events[pair[0]] else {
            unreachable!()
        };
        assert!(events[pair[0]..pair[1]]
            .iter()
            .any(|e| e == &MockEvent::Polled(*signature)));
    }
    assert_eq!(transport.sent_markers(), vec![1, 2, 3]);
}

#[tokio::test]
async fn failing_sequential_group_aborts_the_following_sequential_group() {
    let transport = Arc::new(MockTransport::new().with_rule(2, Rule::FailOnChain(Some(1))));
    let mut schedule = plan(marked(&[1, 2]), SequencePolicy::Sequential);
    schedule.extend(plan(marked(&[3, 4]), SequencePolicy::Sequential));
    schedule.extend(plan(marked(&[5]), SequencePolicy::StopOnFailure));

    let report = engine(&transport, Arc::new(MockWallet::new()))
        .submit(schedule)
        .await;

    let outcomes = report.outcomes();
    assert!(outcomes[0].is_confirmed());
    assert!(outcomes[1].is_failed());
    assert_eq!(outcomes[2], &BatchOutcome::Skipped);
    assert_eq!(outcomes[3], &BatchOutcome::Skipped);
    // Different policy, so a new run that is not aborted
    assert!(outcomes[4].is_confirmed());
    assert_eq!(transport.sent_markers(), vec![1, 2, 5]);
}

#[tokio::test]
async fn wallet_rejection_fails_first_batch_and_skips_the_rest() {
    let transport = Arc::new(MockTransport::new());
    let report = engine(&transport, Arc::new(MockWallet::rejecting()))
        .submit(plan(marked(&[1, 2]), SequencePolicy::Sequential))
        .await;

    let outcomes = report.outcomes();
    assert!(matches!(
        outcomes[0],
        BatchOutcome::Failed(SubmissionError::Signing(SigningFailure::Rejected(_)))
    ));
    assert_eq!(outcomes[1], &BatchOutcome::Skipped);
    assert_eq!(transport.sent_count(), 0);
}

#[tokio::test]
async fn send_failure_is_reported_as_submit_error() {
    let transport = Arc::new(MockTransport::new().with_rule(1, Rule::FailSend));
    let report = engine(&transport, Arc::new(MockWallet::new()))
        .submit(plan(marked(&[1]), SequencePolicy::StopOnFailure))
        .await;

    let err = report.outcomes()[0].error().cloned();
    assert!(matches!(err, Some(SubmissionError::Submit(_))));
    assert!(err.map(|e| e.is_retryable()).unwrap_or(false));
}

#[tokio::test]
async fn cancelled_engine_sends_nothing() {
    let transport = Arc::new(MockTransport::new());
    let engine = engine(&transport, Arc::new(MockWallet::new()));
    engine.cancel_handle().cancel();

    let mut schedule = plan(marked(&[1, 2]), SequencePolicy::Sequential);
    schedule.extend(plan(marked(&[3, 4]), SequencePolicy::Parallel));
    let report = engine.submit(schedule).await;

    assert_eq!(report.skipped_count(), 4);
    assert!(!report.success());
    assert_eq!(transport.sent_count(), 0);
}
