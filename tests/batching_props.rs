//! Property tests for chunking and phase splitting

use proptest::prelude::*;

use govflow::test_utils::marker_instruction;
use govflow::tx_builder::{
    chunk, chunk_with_empty_signers, into_phases, plan, InstructionBatch, SequencePolicy,
};

fn policy() -> impl Strategy<Value = SequencePolicy> {
    prop_oneof![
        Just(SequencePolicy::Sequential),
        Just(SequencePolicy::Parallel),
        Just(SequencePolicy::StopOnFailure),
    ]
}

proptest! {
    #[test]
    fn chunking_preserves_order_and_bounds(len in 0usize..200, size in 1usize..25) {
        let items: Vec<usize> = (0..len).collect();
        let chunks = chunk(&items, size).unwrap();

        prop_assert_eq!(chunks.len(), len.div_ceil(size));
        prop_assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= size));
        if let Some((last, full)) = chunks.split_last() {
            prop_assert!(full.iter().all(|c| c.len() == size));
            prop_assert_eq!(last.len(), len - size * full.len());
        }
        prop_assert_eq!(chunks.concat(), items);
    }

    #[test]
    fn unsigned_batches_carry_no_signers(len in 1usize..60, size in 1usize..12) {
        let units: Vec<_> = (0..len).map(|i| marker_instruction(i as u8)).collect();
        let batches = chunk_with_empty_signers(&units, size).unwrap();

        prop_assert!(batches.iter().all(|b| b.signers().is_empty()));
        let flattened: Vec<_> = batches
            .iter()
            .flat_map(|b| b.instructions().iter().cloned())
            .collect();
        prop_assert_eq!(flattened, units);
    }

    #[test]
    fn phases_cover_every_batch_once(policies in prop::collection::vec(policy(), 0..30)) {
        let schedule: Vec<_> = policies
            .iter()
            .enumerate()
            .flat_map(|(i, p)| {
                plan(
                    vec![InstructionBatch::unsigned(vec![marker_instruction(i as u8)])],
                    *p,
                )
            })
            .collect();
        let phases = into_phases(schedule);

        let indices: Vec<usize> = phases
            .iter()
            .flat_map(|phase| phase.batches.iter().map(|(i, _)| *i))
            .collect();
        prop_assert_eq!(indices, (0..policies.len()).collect::<Vec<_>>());

        // Adjacent phases never share a policy
        for pair in phases.windows(2) {
            prop_assert_ne!(pair[0].policy, pair[1].policy);
        }
        for phase in &phases {
            prop_assert!(phase.batches.iter().all(|(_, b)| b.policy() == phase.policy));
        }
    }
}

#[test]
fn zero_chunk_size_is_rejected() {
    assert!(chunk(&[1, 2, 3], 0).is_err());
}
