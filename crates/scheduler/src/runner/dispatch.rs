use std::sync::Arc;

use async_trait::async_trait;

use taskq_core::{Config, Task, TaskKind};

use super::{SimpleAsyncRunner, StagedRunner, TaskFailure, TaskRunner};
use crate::random::SharedRandom;

/// Routes a task to the runner registered for its kind.
#[derive(Clone)]
pub struct KindDispatcher {
    simple: Arc<dyn TaskRunner>,
    staged: Arc<dyn TaskRunner>,
}

impl KindDispatcher {
    pub fn new(simple: Arc<dyn TaskRunner>, staged: Arc<dyn TaskRunner>) -> Self {
        Self { simple, staged }
    }

    /// Both built-in strategies drawing from one shared source.
    pub fn from_config(config: &Config, rng: SharedRandom) -> Self {
        Self::new(
            Arc::new(SimpleAsyncRunner::new(config.simple.clone(), rng.clone())),
            Arc::new(StagedRunner::new(config.staged.clone(), rng)),
        )
    }

    fn runner_for(&self, kind: TaskKind) -> &Arc<dyn TaskRunner> {
        match kind {
            TaskKind::SimpleAsync => &self.simple,
            TaskKind::Staged => &self.staged,
        }
    }
}

#[async_trait]
impl TaskRunner for KindDispatcher {
    async fn run(&self, task: &Task) -> Result<(), TaskFailure> {
        self.runner_for(task.kind).run(task).await
    }
}
