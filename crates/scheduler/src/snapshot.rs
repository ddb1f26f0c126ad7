use std::fmt;

use serde::{Deserialize, Serialize};

use taskq_core::{Priority, Task, TaskId, TaskKind, TaskStatus};

/// Whether the scheduler has a task in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    Idle,
    Processing,
}

/// Display row for one known task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: TaskId,
    pub status: TaskStatus,
    pub priority: Priority,
    pub kind: TaskKind,
}

impl From<&Task> for TaskView {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            status: task.status,
            priority: task.priority,
            kind: task.kind,
        }
    }
}

/// Observable scheduler state, published after every transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub state: SchedulerState,
    pub current_task_id: Option<TaskId>,
    /// Pending ids in scheduling order.
    pub queue: Vec<TaskId>,
    /// Every known task in insertion order.
    pub tasks: Vec<TaskView>,
    /// Commands the scheduler has applied so far.
    pub commands_applied: u64,
}

impl Default for SchedulerSnapshot {
    fn default() -> Self {
        Self {
            state: SchedulerState::Idle,
            current_task_id: None,
            queue: Vec::new(),
            tasks: Vec::new(),
            commands_applied: 0,
        }
    }
}

impl SchedulerSnapshot {
    /// Idle with nothing left to pull.
    pub fn is_settled(&self) -> bool {
        self.state == SchedulerState::Idle && self.queue.is_empty()
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskView> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn count_with_status(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }
}

impl fmt::Display for SchedulerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue: Vec<String> = self.queue.iter().map(ToString::to_string).collect();
        write!(f, "state={:?}", self.state)?;
        if let Some(id) = self.current_task_id {
            write!(f, " current={id}")?;
        }
        writeln!(f, " queue=[{}]", queue.join(", "))?;
        for task in &self.tasks {
            writeln!(
                f,
                "  {:<5} p={:<2} {:<12} {:?}",
                task.id.to_string(),
                task.priority.get(),
                task.kind.as_str(),
                task.status
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(id: u64, status: TaskStatus) -> TaskView {
        TaskView {
            id: TaskId::new(id),
            status,
            priority: Priority::new(5).unwrap(),
            kind: TaskKind::SimpleAsync,
        }
    }

    #[test]
    fn default_is_settled() {
        let snap = SchedulerSnapshot::default();
        assert!(snap.is_settled());
        assert!(snap.tasks.is_empty());
    }

    #[test]
    fn queued_work_is_not_settled() {
        let snap = SchedulerSnapshot {
            queue: vec![TaskId::new(2)],
            tasks: vec![view(1, TaskStatus::Done), view(2, TaskStatus::Waiting)],
            ..Default::default()
        };
        assert!(!snap.is_settled());
        assert_eq!(snap.count_with_status(TaskStatus::Waiting), 1);
        assert_eq!(snap.task(TaskId::new(1)).unwrap().status, TaskStatus::Done);
        assert!(snap.task(TaskId::new(3)).is_none());
    }

    #[test]
    fn display_lists_tasks() {
        let snap = SchedulerSnapshot {
            state: SchedulerState::Processing,
            current_task_id: Some(TaskId::new(1)),
            queue: vec![TaskId::new(2)],
            tasks: vec![view(1, TaskStatus::Processing), view(2, TaskStatus::Waiting)],
            commands_applied: 2,
        };
        let text = snap.to_string();
        assert!(text.starts_with("state=Processing current=#1 queue=[#2]"));
        assert!(text.contains("#2"));
        assert!(text.contains("Waiting"));
    }

    #[test]
    fn serializes_to_json() {
        let snap = SchedulerSnapshot {
            tasks: vec![view(1, TaskStatus::Errored)],
            ..Default::default()
        };
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["state"], "Idle");
        assert_eq!(json["tasks"][0]["id"], 1);
        assert_eq!(json["tasks"][0]["status"], "Errored");
        assert_eq!(json["tasks"][0]["priority"], 5);
    }
}
