//! End-to-end runs through the real runners on a paused tokio clock.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use taskq_core::{Config, Priority, TaskId, TaskKind, TaskStatus};
use taskq_scheduler::{
    KindDispatcher, Scheduler, SchedulerHandle, SchedulerState, ScriptedRandom, SeededRandom,
    SharedRandom,
};

fn p(value: u8) -> Priority {
    Priority::new(value).unwrap()
}

fn id(raw: u64) -> TaskId {
    TaskId::new(raw)
}

fn spawn_with(config: &Config, rng: SharedRandom) -> SchedulerHandle {
    let runner = Arc::new(KindDispatcher::from_config(config, rng));
    let (handle, _join) = Scheduler::spawn(runner);
    handle
}

#[tokio::test(start_paused = true)]
async fn reprioritized_task_overtakes_and_outcomes_follow_draws() {
    // staged #1 gate; #2 delay + failure roll; #3 delay + failure roll
    let rng = SharedRandom::new(ScriptedRandom::new(vec![0.1, 0.0, 0.9, 0.5, 0.1]));
    let handle = spawn_with(&Config::default(), rng);
    let started = Instant::now();

    handle.add_task(p(1), TaskKind::Staged).await.unwrap();
    handle.add_task(p(3), TaskKind::SimpleAsync).await.unwrap();
    handle.add_task(p(7), TaskKind::SimpleAsync).await.unwrap();
    let snap = handle.wait_for(|s| s.commands_applied >= 3).await.unwrap();
    assert_eq!(snap.current_task_id, Some(id(1)));
    assert_eq!(snap.queue, vec![id(3), id(2)]);

    handle.update_priority(id(2), p(9)).await.unwrap();
    let snap = handle.wait_for(|s| s.commands_applied >= 4).await.unwrap();
    assert_eq!(snap.queue, vec![id(2), id(3)]);

    let after_first = handle
        .wait_for(|s| s.current_task_id == Some(id(2)))
        .await
        .unwrap();
    assert_eq!(after_first.task(id(1)).unwrap().status, TaskStatus::Done);
    assert_eq!(after_first.queue, vec![id(3)]);

    let done = handle.wait_until_settled().await.unwrap();
    assert_eq!(done.task(id(2)).unwrap().status, TaskStatus::Done);
    assert_eq!(done.task(id(3)).unwrap().status, TaskStatus::Errored);
    assert_eq!(done.task(id(2)).unwrap().priority, p(9));

    // 3000ms staged + 3000ms + 4000ms simple
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(10_000), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(10_100), "elapsed {elapsed:?}");

    let metrics = handle.metrics();
    assert_eq!(metrics.tasks_done, 2);
    assert_eq!(metrics.tasks_errored, 1);
    assert_eq!(metrics.priority_updates_applied, 1);
    assert_eq!(metrics.executions_by_kind[&TaskKind::SimpleAsync], 2);
}

#[tokio::test(start_paused = true)]
async fn every_task_terminates_within_bounded_time() {
    let rng = SharedRandom::new(SeededRandom::from_seed(2024));
    let handle = spawn_with(&Config::default(), rng);
    let started = Instant::now();

    let kinds = [TaskKind::SimpleAsync, TaskKind::Staged];
    for n in 0..12u8 {
        let kind = kinds[usize::from(n % 2)];
        handle.add_task(p(n % 10 + 1), kind).await.unwrap();
    }
    let snap = handle.wait_until_settled().await.unwrap();

    assert_eq!(snap.tasks.len(), 12);
    assert!(snap.tasks.iter().all(|t| t.status.is_terminal()));
    assert_eq!(snap.state, SchedulerState::Idle);

    // six simple tasks under 5s each, six staged tasks at most 3s each
    assert!(started.elapsed() <= Duration::from_millis(6 * 5000 + 6 * 3000));

    let metrics = handle.metrics();
    assert_eq!(metrics.tasks_finished(), 12);
    assert_eq!(
        metrics.tasks_done as usize,
        snap.count_with_status(TaskStatus::Done)
    );
}

#[tokio::test(start_paused = true)]
async fn configured_probabilities_decide_outcomes() {
    let config = Config::from_toml(
        r#"
[simple]
min_delay_ms = 10
max_delay_ms = 20
failure_probability = 1.0

[staged]
awaiting_resources_ms = 0
acquiring_context_ms = 0
step_one_ms = 0
step_two_ms = 0
releasing_resources_ms = 0
success_probability = 1.0
"#,
    )
    .unwrap();
    let handle = spawn_with(&config, SharedRandom::new(SeededRandom::from_seed(1)));

    handle.add_task(p(5), TaskKind::SimpleAsync).await.unwrap();
    handle.add_task(p(5), TaskKind::Staged).await.unwrap();
    handle.add_task(p(5), TaskKind::SimpleAsync).await.unwrap();
    handle.add_task(p(5), TaskKind::Staged).await.unwrap();
    let snap = handle.wait_until_settled().await.unwrap();

    for task in &snap.tasks {
        let expected = match task.kind {
            TaskKind::SimpleAsync => TaskStatus::Errored,
            TaskKind::Staged => TaskStatus::Done,
        };
        assert_eq!(task.status, expected, "task {}", task.id);
    }
}

#[tokio::test(start_paused = true)]
async fn resubmitting_after_failure_creates_a_new_task() {
    let rng = SharedRandom::new(ScriptedRandom::new(vec![0.9]));
    let handle = spawn_with(&Config::default(), rng);

    handle.add_task(p(4), TaskKind::Staged).await.unwrap();
    let snap = handle.wait_until_settled().await.unwrap();
    assert_eq!(snap.task(id(1)).unwrap().status, TaskStatus::Errored);

    handle.add_task(p(4), TaskKind::Staged).await.unwrap();
    let snap = handle.wait_until_settled().await.unwrap();
    assert_eq!(snap.tasks.len(), 2);
    assert_eq!(snap.task(id(1)).unwrap().status, TaskStatus::Errored);
    assert!(snap.task(id(2)).unwrap().status.is_terminal());
}
