//! Single-consumer priority task scheduler.
//!
//! Tasks are queued by priority (highest first, ties by id) and run one at a
//! time through a [`TaskRunner`]. The synchronous [`SchedulerMachine`] holds
//! the rules; the async [`Scheduler`] service drives it on tokio and
//! publishes a [`SchedulerSnapshot`] after every transition.

pub mod error;
pub mod lifecycle;
pub mod machine;
pub mod metrics;
pub mod queue;
pub mod random;
pub mod runner;
pub mod service;
pub mod snapshot;

pub use error::SchedulerError;
pub use lifecycle::{StagedMachine, StagedPhase};
pub use machine::{Command, CommandOutcome, SchedulerMachine};
pub use metrics::SchedulerMetrics;
pub use random::{RandomSource, ScriptedRandom, SeededRandom, SharedRandom};
pub use runner::{KindDispatcher, SimpleAsyncRunner, StagedRunner, TaskFailure, TaskRunner};
pub use service::{Scheduler, SchedulerHandle};
pub use snapshot::{SchedulerSnapshot, SchedulerState, TaskView};
