use async_trait::async_trait;
use tracing::debug;

use taskq_core::config::StagedTaskConfig;
use taskq_core::Task;

use super::{TaskFailure, TaskRunner};
use crate::lifecycle::{StagedMachine, StagedPhase};
use crate::random::SharedRandom;

/// Runs a fresh [`StagedMachine`] per task. `Done` is success, `Failed` is
/// [`TaskFailure::OutcomeGate`].
#[derive(Debug, Clone)]
pub struct StagedRunner {
    config: StagedTaskConfig,
    rng: SharedRandom,
}

impl StagedRunner {
    pub fn new(config: StagedTaskConfig, rng: SharedRandom) -> Self {
        Self { config, rng }
    }
}

#[async_trait]
impl TaskRunner for StagedRunner {
    async fn run(&self, task: &Task) -> Result<(), TaskFailure> {
        let mut machine = StagedMachine::new(self.config.clone());
        let outcome = machine.run(&self.rng).await;
        debug!(task_id = %task.id, ?outcome, "staged task finished");
        match outcome {
            StagedPhase::Done => Ok(()),
            _ => Err(TaskFailure::OutcomeGate),
        }
    }
}
