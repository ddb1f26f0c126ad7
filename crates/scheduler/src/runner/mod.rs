//! Task execution strategies.
//!
//! The scheduler only sees [`TaskRunner`]. [`KindDispatcher`] routes each task
//! to the strategy for its kind: [`SimpleAsyncRunner`] for one timed operation,
//! [`StagedRunner`] for the phase machine in [`crate::lifecycle`].

mod dispatch;
mod simple;
mod staged;

use async_trait::async_trait;

use taskq_core::Task;

pub use dispatch::KindDispatcher;
pub use simple::SimpleAsyncRunner;
pub use staged::StagedRunner;

/// Why a task run ended in failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskFailure {
    #[error("simulated failure after {after_ms}ms")]
    Simulated { after_ms: u64 },
    #[error("staged task failed at the outcome gate")]
    OutcomeGate,
}

/// Runs one task to completion.
///
/// Every call resolves exactly once, with no partial result. Runners never
/// touch scheduler state; the scheduler records the outcome.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: &Task) -> Result<(), TaskFailure>;
}
