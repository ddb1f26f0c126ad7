//! Async scheduler service.
//!
//! One tokio task owns the [`SchedulerMachine`] and the in-flight runner
//! future. Commands arrive over an mpsc channel and snapshots leave through a
//! watch channel, so nothing outside this task touches scheduler state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use taskq_core::{Priority, Task, TaskId, TaskKind};

use crate::error::SchedulerError;
use crate::machine::{Command, CommandOutcome, SchedulerMachine};
use crate::metrics::SchedulerMetrics;
use crate::runner::{TaskFailure, TaskRunner};
use crate::snapshot::SchedulerSnapshot;

/// Commands buffered before `send` waits.
const COMMAND_BUFFER: usize = 64;

/// The runner future for the current task, polled by the service loop.
struct InFlight {
    task_id: TaskId,
    kind: TaskKind,
    started_at: Instant,
    run: BoxFuture<'static, Result<(), TaskFailure>>,
}

struct Completion {
    task_id: TaskId,
    kind: TaskKind,
    elapsed: Duration,
    outcome: Result<(), TaskFailure>,
}

/// Resolves when the in-flight run finishes, clearing the slot.
/// Pending forever while the slot is empty.
async fn next_completion(slot: &mut Option<InFlight>) -> Completion {
    let Some(flight) = slot.as_mut() else {
        return std::future::pending().await;
    };
    let outcome = flight.run.as_mut().await;
    let completion = Completion {
        task_id: flight.task_id,
        kind: flight.kind,
        elapsed: flight.started_at.elapsed(),
        outcome,
    };
    *slot = None;
    completion
}

pub struct Scheduler {
    machine: SchedulerMachine,
    runner: Arc<dyn TaskRunner>,
    commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<SchedulerSnapshot>,
    metrics: Arc<RwLock<SchedulerMetrics>>,
}

impl Scheduler {
    /// Create the service and its first handle. Nothing runs until
    /// [`run`](Self::run) is awaited.
    pub fn new(runner: Arc<dyn TaskRunner>) -> (Self, SchedulerHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let machine = SchedulerMachine::new();
        let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot());
        let metrics = Arc::new(RwLock::new(SchedulerMetrics::default()));

        let scheduler = Self {
            machine,
            runner,
            commands: command_rx,
            snapshots: snapshot_tx,
            metrics: Arc::clone(&metrics),
        };
        let handle = SchedulerHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
            metrics,
            sent: Arc::new(AtomicU64::new(0)),
        };
        (scheduler, handle)
    }

    /// Create the service and run it on a new tokio task.
    pub fn spawn(
        runner: Arc<dyn TaskRunner>,
    ) -> (SchedulerHandle, JoinHandle<Result<(), SchedulerError>>) {
        let (scheduler, handle) = Self::new(runner);
        (handle, tokio::spawn(scheduler.run()))
    }

    /// Get an Arc to the metrics (for reads after every handle is gone).
    pub fn metrics_handle(&self) -> Arc<RwLock<SchedulerMetrics>> {
        Arc::clone(&self.metrics)
    }

    /// Run until every handle is dropped and the remaining work has drained.
    ///
    /// A started task always runs to completion. An error here means the
    /// machine's invariants were broken and the loop stopped.
    pub async fn run(mut self) -> Result<(), SchedulerError> {
        info!("scheduler started");
        let mut in_flight: Option<InFlight> = None;
        let mut commands_open = true;

        loop {
            if in_flight.is_none() {
                if let Some(task) = self.machine.advance()? {
                    in_flight = Some(self.start(task));
                }
            }
            self.publish();

            if !commands_open && in_flight.is_none() {
                break;
            }

            tokio::select! {
                command = self.commands.recv(), if commands_open => match command {
                    Some(command) => self.apply(command),
                    None => {
                        commands_open = false;
                        info!(
                            queued = self.machine.queue().len(),
                            in_flight = in_flight.is_some(),
                            "command channel closed, draining"
                        );
                    }
                },
                completion = next_completion(&mut in_flight) => {
                    self.finish(completion)?;
                }
            }
        }

        info!(
            tasks = self.machine.tasks().count(),
            commands = self.machine.commands_applied(),
            "scheduler stopped"
        );
        Ok(())
    }

    fn start(&self, task: Task) -> InFlight {
        let runner = Arc::clone(&self.runner);
        let task_id = task.id;
        let kind = task.kind;
        InFlight {
            task_id,
            kind,
            started_at: Instant::now(),
            run: async move { runner.run(&task).await }.boxed(),
        }
    }

    fn apply(&mut self, command: Command) {
        let outcome = self.machine.apply(command);
        debug!(?outcome, "command applied");
        if let Ok(mut m) = self.metrics.write() {
            match outcome {
                CommandOutcome::Enqueued(_) => m.tasks_enqueued += 1,
                CommandOutcome::PriorityUpdated(_) => m.priority_updates_applied += 1,
                CommandOutcome::PriorityUpdateIgnored(_) => m.priority_updates_ignored += 1,
            }
        }
    }

    fn finish(&mut self, completion: Completion) -> Result<(), SchedulerError> {
        let finished = self.machine.finish_current(&completion.outcome)?;
        debug_assert_eq!(finished, completion.task_id);
        debug!(
            task_id = %finished,
            elapsed_ms = completion.elapsed.as_millis() as u64,
            "run resolved"
        );
        if let Ok(mut m) = self.metrics.write() {
            m.record_execution(completion.kind, completion.elapsed, completion.outcome.is_ok());
        }
        Ok(())
    }

    fn publish(&self) {
        let snapshot = self.machine.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

/// Cloneable client for a running [`Scheduler`].
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<SchedulerSnapshot>,
    metrics: Arc<RwLock<SchedulerMetrics>>,
    /// Commands accepted by the channel, across all clones.
    sent: Arc<AtomicU64>,
}

impl SchedulerHandle {
    pub async fn send(&self, command: Command) -> Result<(), SchedulerError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SchedulerError::ChannelClosed)?;
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub async fn add_task(&self, priority: Priority, kind: TaskKind) -> Result<(), SchedulerError> {
        self.send(Command::AddTask { priority, kind }).await
    }

    /// Ignored by the scheduler unless `id` is still waiting.
    pub async fn update_priority(
        &self,
        id: TaskId,
        new_priority: Priority,
    ) -> Result<(), SchedulerError> {
        self.send(Command::UpdatePriority { id, new_priority }).await
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerSnapshot> {
        self.snapshots.clone()
    }

    pub fn metrics(&self) -> SchedulerMetrics {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait for the first snapshot matching `predicate`, including the
    /// current one.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SchedulerSnapshot) -> bool,
    ) -> Result<SchedulerSnapshot, SchedulerError> {
        let mut rx = self.snapshots.clone();
        let snapshot = rx
            .wait_for(predicate)
            .await
            .map_err(|_| SchedulerError::ChannelClosed)?
            .clone();
        Ok(snapshot)
    }

    /// Wait until every command sent so far has been applied and the
    /// scheduler is idle with an empty queue.
    pub async fn wait_until_settled(&self) -> Result<SchedulerSnapshot, SchedulerError> {
        let target = self.sent.load(Ordering::SeqCst);
        self.wait_for(|s| s.commands_applied >= target && s.is_settled())
            .await
    }
}
