use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use taskq_core::config::SimpleTaskConfig;
use taskq_core::Task;

use super::{TaskFailure, TaskRunner};
use crate::random::SharedRandom;

/// Waits a random delay, then succeeds or fails on a second draw.
#[derive(Debug, Clone)]
pub struct SimpleAsyncRunner {
    config: SimpleTaskConfig,
    rng: SharedRandom,
}

impl SimpleAsyncRunner {
    pub fn new(config: SimpleTaskConfig, rng: SharedRandom) -> Self {
        Self { config, rng }
    }

    /// Map a unit draw onto `[min_delay_ms, max_delay_ms)`, floored to whole ms.
    pub fn delay_for(&self, unit: f64) -> Duration {
        let min = self.config.min_delay_ms;
        let max = self.config.max_delay_ms;
        let span = max.saturating_sub(min) as f64;
        let ms = (unit * span + min as f64).floor() as u64;
        let ceiling = max.saturating_sub(1).max(min);
        Duration::from_millis(ms.clamp(min, ceiling))
    }
}

#[async_trait]
impl TaskRunner for SimpleAsyncRunner {
    async fn run(&self, task: &Task) -> Result<(), TaskFailure> {
        let delay = self.delay_for(self.rng.next_unit());
        debug!(task_id = %task.id, delay_ms = delay.as_millis() as u64, "simple task running");
        tokio::time::sleep(delay).await;

        let roll = self.rng.next_unit();
        if roll < self.config.failure_probability {
            return Err(TaskFailure::Simulated {
                after_ms: delay.as_millis() as u64,
            });
        }
        Ok(())
    }
}
