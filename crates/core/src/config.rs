use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TaskqError;

/// Chance that a simple task fails once its delay has elapsed.
pub const SIMPLE_FAILURE_PROBABILITY: f64 = 0.5;
/// Chance that the staged outcome gate lets a task through to `Done`.
pub const STAGED_SUCCESS_PROBABILITY: f64 = 0.2;

pub const SIMPLE_MIN_DELAY_MS: u64 = 3000;
pub const SIMPLE_MAX_DELAY_MS: u64 = 5000;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub simple: SimpleTaskConfig,
    #[serde(default)]
    pub staged: StagedTaskConfig,
    /// Fixed seed for the random source. `None` seeds from entropy.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

// ── Simple tasks ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleTaskConfig {
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    /// Exclusive upper bound of the delay draw.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_failure_probability")]
    pub failure_probability: f64,
}

fn default_min_delay_ms() -> u64 {
    SIMPLE_MIN_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    SIMPLE_MAX_DELAY_MS
}

fn default_failure_probability() -> f64 {
    SIMPLE_FAILURE_PROBABILITY
}

impl Default for SimpleTaskConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            failure_probability: default_failure_probability(),
        }
    }
}

impl SimpleTaskConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

// ── Staged tasks ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedTaskConfig {
    #[serde(default = "default_awaiting_resources_ms")]
    pub awaiting_resources_ms: u64,
    #[serde(default = "default_phase_ms")]
    pub acquiring_context_ms: u64,
    #[serde(default = "default_phase_ms")]
    pub step_one_ms: u64,
    #[serde(default = "default_phase_ms")]
    pub step_two_ms: u64,
    #[serde(default = "default_phase_ms")]
    pub releasing_resources_ms: u64,
    #[serde(default = "default_success_probability")]
    pub success_probability: f64,
}

fn default_awaiting_resources_ms() -> u64 {
    1000
}

fn default_phase_ms() -> u64 {
    500
}

fn default_success_probability() -> f64 {
    STAGED_SUCCESS_PROBABILITY
}

impl Default for StagedTaskConfig {
    fn default() -> Self {
        Self {
            awaiting_resources_ms: default_awaiting_resources_ms(),
            acquiring_context_ms: default_phase_ms(),
            step_one_ms: default_phase_ms(),
            step_two_ms: default_phase_ms(),
            releasing_resources_ms: default_phase_ms(),
            success_probability: default_success_probability(),
        }
    }
}

impl StagedTaskConfig {
    /// Sum of every phase delay on the success path.
    pub fn total_duration(&self) -> Duration {
        let ms = [
            self.acquiring_context_ms,
            self.step_one_ms,
            self.step_two_ms,
            self.releasing_resources_ms,
        ]
        .into_iter()
        .fold(self.awaiting_resources_ms, u64::saturating_add);
        Duration::from_millis(ms)
    }
}

// ── Loading & Validation ──────────────────────────────────────

impl Config {
    /// Parse config from a TOML string, then apply `TASKQ_*` env overrides.
    pub fn from_toml(toml_str: &str) -> Result<Self, TaskqError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TaskqError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults plus env overrides (call `load_dotenv()` first).
    pub fn from_env() -> Result<Self, TaskqError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    // ── Environment variable overrides ────────────────────────

    /// Apply environment variable overrides.
    ///
    /// - `TASKQ_SIMPLE_MIN_DELAY_MS` → `simple.min_delay_ms`
    /// - `TASKQ_SIMPLE_MAX_DELAY_MS` → `simple.max_delay_ms`
    /// - `TASKQ_SIMPLE_FAILURE_PROBABILITY` → `simple.failure_probability`
    /// - `TASKQ_STAGED_SUCCESS_PROBABILITY` → `staged.success_probability`
    /// - `TASKQ_RNG_SEED` → `rng_seed`
    ///
    /// Values that fail to parse are ignored.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(env_opt);
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ms) = lookup("TASKQ_SIMPLE_MIN_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.simple.min_delay_ms = ms;
        }
        if let Some(ms) = lookup("TASKQ_SIMPLE_MAX_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.simple.max_delay_ms = ms;
        }
        if let Some(p) = lookup("TASKQ_SIMPLE_FAILURE_PROBABILITY").and_then(|v| v.parse().ok()) {
            self.simple.failure_probability = p;
        }
        if let Some(p) = lookup("TASKQ_STAGED_SUCCESS_PROBABILITY").and_then(|v| v.parse().ok()) {
            self.staged.success_probability = p;
        }
        if let Some(seed) = lookup("TASKQ_RNG_SEED").and_then(|v| v.parse().ok()) {
            self.rng_seed = Some(seed);
        }
    }

    // ── Validation ────────────────────────────────────────────

    pub fn validate(&self) -> Result<(), TaskqError> {
        check_probability("simple.failure_probability", self.simple.failure_probability)?;
        check_probability("staged.success_probability", self.staged.success_probability)?;
        if self.simple.min_delay_ms >= self.simple.max_delay_ms {
            return Err(TaskqError::Config(format!(
                "simple.min_delay_ms ({}) must be below simple.max_delay_ms ({})",
                self.simple.min_delay_ms, self.simple.max_delay_ms
            )));
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!(
            "  simple:  delay={}..{}ms, failure_probability={}",
            self.simple.min_delay_ms,
            self.simple.max_delay_ms,
            self.simple.failure_probability
        );
        tracing::info!(
            "  staged:  phases={}/{}/{}/{}/{}ms, success_probability={}",
            self.staged.awaiting_resources_ms,
            self.staged.acquiring_context_ms,
            self.staged.step_one_ms,
            self.staged.step_two_ms,
            self.staged.releasing_resources_ms,
            self.staged.success_probability
        );
        match self.rng_seed {
            Some(seed) => tracing::info!("  rng:     seed={}", seed),
            None => tracing::info!("  rng:     seed=(entropy)"),
        }
    }
}

fn check_probability(name: &str, value: f64) -> Result<(), TaskqError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(TaskqError::Config(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}
