//! Sequence planner: tag batches with the failure-handling contract they share
//!
//! One logical operation gets one policy. Mixing policies is done by planning
//! each logical group separately and concatenating the results; the engine
//! then runs contiguous same-policy runs as phases, left to right. Adjacent
//! groups with the same policy merge into one phase.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::tx_builder::instructions::InstructionBatch;

/// How batches within one contiguous run are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencePolicy {
    /// One after another; a failure skips the rest of the run
    Sequential,
    /// All in flight together; failures do not cancel siblings
    Parallel,
    /// Same scheduling as `Sequential`
    StopOnFailure,
}

impl SequencePolicy {
    /// Whether a failure aborts the remainder of the run
    pub fn aborts_on_failure(&self) -> bool {
        match self {
            Self::Sequential | Self::StopOnFailure => true,
            Self::Parallel => false,
        }
    }
}

impl fmt::Display for SequencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::StopOnFailure => "stop_on_failure",
        };
        f.write_str(name)
    }
}

/// A batch tagged with its sequencing policy
///
/// Created right before submission and consumed once by the engine.
#[derive(Debug, Clone)]
pub struct TypedInstructionBatch {
    batch: InstructionBatch,
    policy: SequencePolicy,
}

impl TypedInstructionBatch {
    pub fn new(batch: InstructionBatch, policy: SequencePolicy) -> Self {
        Self { batch, policy }
    }

    pub fn policy(&self) -> SequencePolicy {
        self.policy
    }

    pub fn batch(&self) -> &InstructionBatch {
        &self.batch
    }

    pub fn into_batch(self) -> InstructionBatch {
        self.batch
    }
}

/// Tag every batch with the same policy
pub fn plan(batches: Vec<InstructionBatch>, policy: SequencePolicy) -> Vec<TypedInstructionBatch> {
    batches
        .into_iter()
        .map(|batch| TypedInstructionBatch::new(batch, policy))
        .collect()
}

/// A contiguous run of batches sharing one policy
#[derive(Debug)]
pub struct Phase {
    pub policy: SequencePolicy,
    /// Batches with their position in the submitted sequence
    pub batches: Vec<(usize, TypedInstructionBatch)>,
}

/// Group the outer schedule into phases, preserving order
pub fn into_phases(batches: Vec<TypedInstructionBatch>) -> Vec<Phase> {
    let runs = batches
        .into_iter()
        .enumerate()
        .chunk_by(|(_, batch)| batch.policy());

    let phases = runs
        .into_iter()
        .map(|(policy, group)| Phase {
            policy,
            batches: group.collect(),
        })
        .collect();
    phases
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_batches(n: usize) -> Vec<InstructionBatch> {
        (0..n).map(|_| InstructionBatch::unsigned(vec![])).collect()
    }

    #[test]
    fn test_plan_tags_every_batch() {
        let typed = plan(empty_batches(3), SequencePolicy::Parallel);
        assert_eq!(typed.len(), 3);
        assert!(typed.iter().all(|t| t.policy() == SequencePolicy::Parallel));
    }

    #[test]
    fn test_into_phases_groups_contiguous_runs() {
        let mut schedule = plan(empty_batches(2), SequencePolicy::Sequential);
        schedule.extend(plan(empty_batches(3), SequencePolicy::Parallel));
        schedule.extend(plan(empty_batches(1), SequencePolicy::Sequential));

        let phases = into_phases(schedule);
        let shape: Vec<(SequencePolicy, Vec<usize>)> = phases
            .iter()
            .map(|p| (p.policy, p.batches.iter().map(|(i, _)| *i).collect()))
            .collect();

        assert_eq!(
            shape,
            vec![
                (SequencePolicy::Sequential, vec![0, 1]),
                (SequencePolicy::Parallel, vec![2, 3, 4]),
                (SequencePolicy::Sequential, vec![5]),
            ]
        );
    }

    #[test]
    fn test_stop_on_failure_is_separate_phase_from_sequential() {
        let mut schedule = plan(empty_batches(1), SequencePolicy::Sequential);
        schedule.extend(plan(empty_batches(1), SequencePolicy::StopOnFailure));
        assert_eq!(into_phases(schedule).len(), 2);
    }

    #[test]
    fn test_abort_semantics() {
        assert!(SequencePolicy::Sequential.aborts_on_failure());
        assert!(SequencePolicy::StopOnFailure.aborts_on_failure());
        assert!(!SequencePolicy::Parallel.aborts_on_failure());
    }
}
