//! Per-batch outcomes and the aggregate report

use chrono::{DateTime, Utc};
use solana_sdk::signature::Signature;
use std::fmt;

use crate::submission::errors::SubmissionError;

/// Terminal state of one batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Confirmed,
    Failed(SubmissionError),
    /// Never sent: an earlier batch in the same run failed, or the run was cancelled
    Skipped,
}

impl BatchOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn error(&self) -> Option<&SubmissionError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirmed => f.write_str("confirmed"),
            Self::Failed(err) => write!(f, "failed: {}", err),
            Self::Skipped => f.write_str("skipped"),
        }
    }
}

/// Result for the batch at `index` in the submitted sequence
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionResult {
    pub index: usize,
    /// Present once the batch was sent, even if it later failed or timed out
    pub signature: Option<Signature>,
    pub outcome: BatchOutcome,
}

impl SubmissionResult {
    pub fn skipped(index: usize) -> Self {
        Self {
            index,
            signature: None,
            outcome: BatchOutcome::Skipped,
        }
    }

    pub fn failed(index: usize, signature: Option<Signature>, err: SubmissionError) -> Self {
        Self {
            index,
            signature,
            outcome: BatchOutcome::Failed(err),
        }
    }
}

/// Aggregate of one engine run, in submission order
#[derive(Debug, Clone)]
pub struct SubmissionReport {
    pub results: Vec<SubmissionResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SubmissionReport {
    /// `true` iff every batch is `Confirmed`
    ///
    /// An empty run is vacuously successful.
    pub fn success(&self) -> bool {
        self.results.iter().all(|r| r.outcome.is_confirmed())
    }

    pub fn confirmed_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_confirmed()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome == BatchOutcome::Skipped)
            .count()
    }

    /// First failed batch in submission order
    pub fn first_failure(&self) -> Option<(usize, &SubmissionError)> {
        self.results
            .iter()
            .find_map(|r| r.outcome.error().map(|err| (r.index, err)))
    }

    pub fn outcomes(&self) -> Vec<&BatchOutcome> {
        self.results.iter().map(|r| &r.outcome).collect()
    }

    /// Signatures of everything that was sent, in order
    pub fn signatures(&self) -> Vec<Signature> {
        self.results.iter().filter_map(|r| r.signature).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcomes: Vec<BatchOutcome>) -> SubmissionReport {
        let now = Utc::now();
        SubmissionReport {
            results: outcomes
                .into_iter()
                .enumerate()
                .map(|(index, outcome)| SubmissionResult {
                    index,
                    signature: None,
                    outcome,
                })
                .collect(),
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn test_success_requires_every_batch_confirmed() {
        assert!(report(vec![BatchOutcome::Confirmed, BatchOutcome::Confirmed]).success());
        assert!(!report(vec![BatchOutcome::Confirmed, BatchOutcome::Skipped]).success());
        assert!(report(vec![]).success());
    }

    #[test]
    fn test_first_failure_and_counts() {
        let r = report(vec![
            BatchOutcome::Confirmed,
            BatchOutcome::Failed(SubmissionError::Submit("reset".into())),
            BatchOutcome::Skipped,
        ]);
        assert_eq!(r.confirmed_count(), 1);
        assert_eq!(r.skipped_count(), 1);
        let (index, err) = r.first_failure().unwrap();
        assert_eq!(index, 1);
        assert_eq!(err.category(), "submit");
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(BatchOutcome::Skipped.to_string(), "skipped");
        assert_eq!(
            BatchOutcome::Failed(SubmissionError::empty_batch()).to_string(),
            "failed: Build error: batch has no instructions"
        );
    }
}
