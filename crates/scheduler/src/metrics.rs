use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use taskq_core::TaskKind;

/// Scheduler counters, shared with the service behind `Arc<RwLock<_>>`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    pub tasks_enqueued: u64,
    pub tasks_done: u64,
    pub tasks_errored: u64,
    pub priority_updates_applied: u64,
    /// Updates whose target was not waiting.
    pub priority_updates_ignored: u64,
    /// Finished runs per kind, successful or not.
    pub executions_by_kind: HashMap<TaskKind, u64>,
    /// Mean run time per kind.
    pub avg_task_duration: HashMap<TaskKind, Duration>,
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl SchedulerMetrics {
    /// Record a finished task run.
    pub fn record_execution(&mut self, kind: TaskKind, duration: Duration, succeeded: bool) {
        if succeeded {
            self.tasks_done += 1;
        } else {
            self.tasks_errored += 1;
        }
        self.last_completed_at = Some(Utc::now());

        let count = {
            let entry = self.executions_by_kind.entry(kind).or_default();
            *entry += 1;
            *entry
        };
        let prev_avg = self.avg_task_duration.get(&kind).copied().unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count == 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
        self.avg_task_duration.insert(kind, new_avg);
    }

    pub fn tasks_finished(&self) -> u64 {
        self.tasks_done + self.tasks_errored
    }
}
