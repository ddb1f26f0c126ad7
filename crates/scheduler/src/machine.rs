//! The scheduler state machine: `Idle` / `Processing` over an ordered queue.
//!
//! Commands mutate the queue and task record without changing the state.
//! `advance` performs `Idle -> Processing` by pulling the queue head, and
//! `finish_current` performs `Processing -> Idle` once the runner resolves.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use taskq_core::{Priority, Task, TaskId, TaskKind, TaskStatus};

use crate::error::SchedulerError;
use crate::queue;
use crate::runner::TaskFailure;
use crate::snapshot::{SchedulerSnapshot, SchedulerState, TaskView};

/// Inbound commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    AddTask { priority: Priority, kind: TaskKind },
    UpdatePriority { id: TaskId, new_priority: Priority },
}

/// What applying a command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Enqueued(TaskId),
    PriorityUpdated(TaskId),
    /// The guard failed: the id was not waiting in the queue.
    PriorityUpdateIgnored(TaskId),
}

#[derive(Debug, Default)]
pub struct SchedulerMachine {
    next_id: u64,
    queue: Vec<TaskId>,
    /// Ids are monotonic, so key order is insertion order.
    tasks: BTreeMap<TaskId, Task>,
    current: Option<TaskId>,
    commands_applied: u64,
}

impl SchedulerMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SchedulerState {
        match self.current {
            Some(_) => SchedulerState::Processing,
            None => SchedulerState::Idle,
        }
    }

    pub fn current_task_id(&self) -> Option<TaskId> {
        self.current
    }

    pub fn current_task(&self) -> Option<&Task> {
        self.current.and_then(|id| self.tasks.get(&id))
    }

    pub fn queue(&self) -> &[TaskId] {
        &self.queue
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// All known tasks in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn commands_applied(&self) -> u64 {
        self.commands_applied
    }

    /// Create a `Waiting` task and slot it into the queue. Never pulls.
    pub fn enqueue(&mut self, priority: Priority, kind: TaskKind) -> TaskId {
        self.next_id += 1;
        let id = TaskId::new(self.next_id);
        self.tasks.insert(id, Task::new(id, priority, kind));
        self.queue.push(id);
        queue::reorder(&mut self.queue, &self.tasks);
        debug!(task_id = %id, %priority, %kind, queue_len = self.queue.len(), "task enqueued");
        id
    }

    /// Change the priority of a queued task. Returns `false`, changing
    /// nothing, when `id` is not waiting in the queue.
    pub fn reprioritize(&mut self, id: TaskId, priority: Priority) -> bool {
        if !self.queue.contains(&id) {
            warn!(task_id = %id, %priority, "priority update ignored, task is not waiting");
            return false;
        }
        let Some(task) = self.tasks.get_mut(&id) else {
            return false;
        };
        let previous = task.priority;
        task.priority = priority;
        queue::reorder(&mut self.queue, &self.tasks);
        debug!(task_id = %id, %previous, %priority, "priority updated");
        true
    }

    /// Apply a command as an internal transition. The scheduler state is
    /// left unchanged; call [`advance`](Self::advance) afterwards.
    pub fn apply(&mut self, command: Command) -> CommandOutcome {
        self.commands_applied += 1;
        match command {
            Command::AddTask { priority, kind } => {
                CommandOutcome::Enqueued(self.enqueue(priority, kind))
            }
            Command::UpdatePriority { id, new_priority } => {
                if self.reprioritize(id, new_priority) {
                    CommandOutcome::PriorityUpdated(id)
                } else {
                    CommandOutcome::PriorityUpdateIgnored(id)
                }
            }
        }
    }

    /// Apply a command, then pull the next task if idle.
    pub fn handle(&mut self, command: Command) -> Result<Option<Task>, SchedulerError> {
        self.apply(command);
        self.advance()
    }

    /// `Idle -> Processing`: pop the queue head and mark it processing.
    /// Returns the started task, or `None` when busy or nothing is queued.
    pub fn advance(&mut self) -> Result<Option<Task>, SchedulerError> {
        if self.current.is_some() || self.queue.is_empty() {
            return Ok(None);
        }
        let id = self.queue.remove(0);
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or(SchedulerError::UnknownTask(id))?;
        task.transition(TaskStatus::Processing)?;
        self.current = Some(id);
        info!(
            task_id = %id,
            priority = %task.priority,
            kind = %task.kind,
            queued = self.queue.len(),
            "task started"
        );
        Ok(Some(task.clone()))
    }

    /// `Processing -> Idle`: record the runner's outcome for the current task.
    pub fn finish_current(
        &mut self,
        outcome: &Result<(), TaskFailure>,
    ) -> Result<TaskId, SchedulerError> {
        let id = self.current.ok_or(SchedulerError::NoCurrentTask)?;
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or(SchedulerError::UnknownTask(id))?;
        match outcome {
            Ok(()) => {
                task.transition(TaskStatus::Done)?;
                info!(task_id = %id, kind = %task.kind, "task done");
            }
            Err(failure) => {
                task.transition(TaskStatus::Errored)?;
                warn!(task_id = %id, kind = %task.kind, error = %failure, "task errored");
            }
        }
        self.current = None;
        Ok(id)
    }

    /// Finish the current task and immediately pull the next one.
    pub fn complete(
        &mut self,
        outcome: &Result<(), TaskFailure>,
    ) -> Result<(TaskId, Option<Task>), SchedulerError> {
        let finished = self.finish_current(outcome)?;
        let next = self.advance()?;
        Ok((finished, next))
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            state: self.state(),
            current_task_id: self.current,
            queue: self.queue.clone(),
            tasks: self.tasks.values().map(TaskView::from).collect(),
            commands_applied: self.commands_applied,
        }
    }

    /// Whether the queue satisfies the ordering rule.
    pub fn queue_is_ordered(&self) -> bool {
        queue::is_ordered(&self.queue, &self.tasks)
    }
}
