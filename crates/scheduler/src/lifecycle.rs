//! Timed phase machine for staged tasks.
//!
//! ```text
//! AwaitingResources -> AcquiringContext -> RunningStepOne -> RunningStepTwo
//!     -> gate -> ReleasingResources -> Done
//!             -> Failed
//! ```
//!
//! Every edge fires after its phase delay. The gate draws once and is the
//! only branch. Nothing outside the machine can alter its path.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use taskq_core::config::StagedTaskConfig;

use crate::random::{RandomSource, SharedRandom};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StagedPhase {
    AwaitingResources,
    AcquiringContext,
    RunningStepOne,
    RunningStepTwo,
    ReleasingResources,
    Done,
    Failed,
}

impl StagedPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StagedPhase::Done | StagedPhase::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct StagedMachine {
    phase: StagedPhase,
    config: StagedTaskConfig,
    gate_evaluations: u32,
}

impl StagedMachine {
    pub fn new(config: StagedTaskConfig) -> Self {
        Self {
            phase: StagedPhase::AwaitingResources,
            config,
            gate_evaluations: 0,
        }
    }

    pub fn phase(&self) -> StagedPhase {
        self.phase
    }

    /// Number of outcome draws taken. At most one per run.
    pub fn gate_evaluations(&self) -> u32 {
        self.gate_evaluations
    }

    /// Delay before the next transition, `None` once terminal.
    pub fn pending_delay(&self) -> Option<Duration> {
        let ms = match self.phase {
            StagedPhase::AwaitingResources => self.config.awaiting_resources_ms,
            StagedPhase::AcquiringContext => self.config.acquiring_context_ms,
            StagedPhase::RunningStepOne => self.config.step_one_ms,
            StagedPhase::RunningStepTwo => self.config.step_two_ms,
            StagedPhase::ReleasingResources => self.config.releasing_resources_ms,
            StagedPhase::Done | StagedPhase::Failed => return None,
        };
        Some(Duration::from_millis(ms))
    }

    /// Take exactly one transition, as if the current phase delay had
    /// elapsed. Terminal phases stay put.
    pub fn advance(&mut self, rng: &mut dyn RandomSource) -> StagedPhase {
        let next = match self.phase {
            StagedPhase::AwaitingResources => StagedPhase::AcquiringContext,
            StagedPhase::AcquiringContext => StagedPhase::RunningStepOne,
            StagedPhase::RunningStepOne => StagedPhase::RunningStepTwo,
            StagedPhase::RunningStepTwo => self.evaluate_gate(rng),
            StagedPhase::ReleasingResources => StagedPhase::Done,
            terminal @ (StagedPhase::Done | StagedPhase::Failed) => terminal,
        };
        if next != self.phase {
            debug!(from = ?self.phase, to = ?next, "staged phase");
            self.phase = next;
        }
        next
    }

    fn evaluate_gate(&mut self, rng: &mut dyn RandomSource) -> StagedPhase {
        self.gate_evaluations += 1;
        let roll = rng.next_unit();
        let passed = roll < self.config.success_probability;
        debug!(roll, threshold = self.config.success_probability, passed, "outcome gate");
        if passed {
            StagedPhase::ReleasingResources
        } else {
            StagedPhase::Failed
        }
    }

    /// Drive the machine to a terminal phase on the tokio timer.
    pub async fn run(&mut self, rng: &SharedRandom) -> StagedPhase {
        while let Some(delay) = self.pending_delay() {
            tokio::time::sleep(delay).await;
            rng.with(|source| self.advance(source));
        }
        self.phase
    }
}
