//! Operator trait + common interfaces.

use fedplan_core::term::Solution;
use fedplan_source::SourceError;
use thiserror::Error;

/// Lazy stream of solutions. Not rewindable: re-execute from the plan.
pub type SolutionStream = Box<dyn Iterator<Item = Result<Solution, OpError>> + Send>;

/// `Clone` so a failed shared result can be replayed to every consumer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("execution error: {0}")]
    Exec(String),

    #[error("internal invariant failed: {0}")]
    Invariant(String),
}

/// Every operator is a solution iterator with a stable name.
pub trait Operator: Iterator<Item = Result<Solution, OpError>> + Send {
    fn name(&self) -> &'static str;
}
