//! Submission module
//!
//! Takes typed batches from the sequence planner, ships them through a
//! [`ChainTransport`] and classifies every batch's terminal state.

pub mod engine;
pub mod errors;
pub mod outcome;
pub mod transport;

pub use engine::{CancelHandle, EngineConfig, SubmissionEngine};
pub use errors::{SigningFailure, SubmissionError};
pub use outcome::{BatchOutcome, SubmissionReport, SubmissionResult};
pub use transport::{ChainTransport, SignatureState, SimulationReport};
