//! Queue ordering: priority descending, then id ascending.
//!
//! The key is a strict total order over `(priority, id)` pairs, so sorting is
//! deterministic and re-sorting a sorted queue leaves it unchanged.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use taskq_core::{Priority, Task, TaskId};

type OrderKey = (Reverse<Option<Priority>>, TaskId);

fn order_key(id: TaskId, tasks: &BTreeMap<TaskId, Task>) -> OrderKey {
    (Reverse(tasks.get(&id).map(|t| t.priority)), id)
}

/// Sort `queue` in place. Ids without a record sort last.
pub fn reorder(queue: &mut [TaskId], tasks: &BTreeMap<TaskId, Task>) {
    queue.sort_by_key(|id| order_key(*id, tasks));
}

/// Whether `queue` already satisfies the ordering rule.
pub fn is_ordered(queue: &[TaskId], tasks: &BTreeMap<TaskId, Task>) -> bool {
    queue
        .windows(2)
        .all(|pair| order_key(pair[0], tasks) < order_key(pair[1], tasks))
}

#[cfg(test)]
mod tests {
    use taskq_core::TaskKind;

    use super::*;

    fn record(entries: &[(u64, u8)]) -> BTreeMap<TaskId, Task> {
        entries
            .iter()
            .map(|&(id, p)| {
                let id = TaskId::new(id);
                (id, Task::new(id, Priority::new(p).unwrap(), TaskKind::SimpleAsync))
            })
            .collect()
    }

    fn ids(raw: &[u64]) -> Vec<TaskId> {
        raw.iter().copied().map(TaskId::new).collect()
    }

    #[test]
    fn higher_priority_first() {
        let tasks = record(&[(1, 3), (2, 7), (3, 5)]);
        let mut queue = ids(&[1, 2, 3]);
        reorder(&mut queue, &tasks);
        assert_eq!(queue, ids(&[2, 3, 1]));
        assert!(is_ordered(&queue, &tasks));
    }

    #[test]
    fn ties_break_by_id() {
        let tasks = record(&[(1, 5), (2, 5), (3, 5)]);
        let mut queue = ids(&[3, 1, 2]);
        reorder(&mut queue, &tasks);
        assert_eq!(queue, ids(&[1, 2, 3]));
    }

    #[test]
    fn reorder_is_idempotent() {
        let tasks = record(&[(1, 2), (2, 9), (3, 9), (4, 1), (5, 6)]);
        let mut queue = ids(&[5, 4, 3, 2, 1]);
        reorder(&mut queue, &tasks);
        let once = queue.clone();
        reorder(&mut queue, &tasks);
        assert_eq!(queue, once);
        assert_eq!(queue, ids(&[2, 3, 5, 1, 4]));
    }

    #[test]
    fn unsorted_queue_detected() {
        let tasks = record(&[(1, 3), (2, 7)]);
        assert!(!is_ordered(&ids(&[1, 2]), &tasks));
        assert!(is_ordered(&ids(&[2, 1]), &tasks));
        assert!(is_ordered(&[], &tasks));
    }

    #[test]
    fn unknown_ids_sort_last() {
        let tasks = record(&[(1, 1)]);
        let mut queue = ids(&[9, 1]);
        reorder(&mut queue, &tasks);
        assert_eq!(queue, ids(&[1, 9]));
    }
}
