//! Fault tolerance for worker task execution
//!
//! Provides checkpointing of task results plus simulated network delay and
//! random task failure. The randomness sits behind [`FaultInjector`] so
//! tests can make it deterministic.

use crate::types::now_millis;
use dashmap::DashMap;
use dsql_core::{Row, TaskId, WorkerId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Configuration for fault simulation and checkpointing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    /// Probability that a task fails before executing
    pub failure_probability: f64,
    /// Lower bound of the simulated network delay (inclusive)
    pub min_delay_ms: u64,
    /// Upper bound of the simulated network delay (exclusive)
    pub max_delay_ms: u64,
    /// Checkpoint every completed task
    pub enable_checkpoints: bool,
    /// Checkpoints at least this old are dropped by periodic cleanup
    pub max_checkpoint_age_ms: u64,
}

impl FaultConfig {
    pub fn max_checkpoint_age(&self) -> Duration {
        Duration::from_millis(self.max_checkpoint_age_ms)
    }
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            failure_probability: 0.10,
            min_delay_ms: 10,
            max_delay_ms: 100,
            enable_checkpoints: true,
            max_checkpoint_age_ms: 300_000,
        }
    }
}

/// Decides whether a task fails and how long the network takes
pub trait FaultInjector: Debug + Send + Sync {
    /// Bernoulli trial with the given success probability
    fn should_fail(&self, probability: f64) -> bool;
    /// Delay to apply in `[min, max)`
    fn network_delay(&self, min: Duration, max: Duration) -> Duration;
}

/// Thread-local RNG backed injector
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomFaultInjector;

impl FaultInjector for RandomFaultInjector {
    fn should_fail(&self, probability: f64) -> bool {
        rand::thread_rng().gen_bool(probability.clamp(0.0, 1.0))
    }

    fn network_delay(&self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let millis = rand::thread_rng().gen_range(min.as_millis() as u64..max.as_millis() as u64);
        Duration::from_millis(millis)
    }
}

/// Never fails, never waits
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFaults;

impl FaultInjector for NoFaults {
    fn should_fail(&self, _probability: f64) -> bool {
        false
    }

    fn network_delay(&self, _min: Duration, _max: Duration) -> Duration {
        Duration::ZERO
    }
}

/// Deterministic outcome for tests
#[derive(Debug, Clone, Copy)]
pub struct FixedFaults {
    /// Fail every task
    pub fail: bool,
    /// Delay applied to every task
    pub delay: Duration,
}

impl FixedFaults {
    /// Every task fails immediately
    pub fn failing() -> Self {
        Self {
            fail: true,
            delay: Duration::ZERO,
        }
    }

    /// Every task succeeds after `delay`
    pub fn delayed(delay: Duration) -> Self {
        Self { fail: false, delay }
    }
}

impl FaultInjector for FixedFaults {
    fn should_fail(&self, _probability: f64) -> bool {
        self.fail
    }

    fn network_delay(&self, _min: Duration, _max: Duration) -> Duration {
        self.delay
    }
}

/// Snapshot of a task's output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointInfo {
    /// Checkpoint ID
    pub checkpoint_id: String,
    /// Task the checkpoint belongs to
    pub task_id: TaskId,
    /// Creation time (Unix millis)
    pub timestamp: u64,
    /// Partial (or final) result rows
    pub rows: Vec<Row>,
    /// State label, e.g. `COMPLETED`
    pub state: String,
}

impl CheckpointInfo {
    /// Milliseconds since creation
    pub fn age_ms(&self) -> u64 {
        now_millis().saturating_sub(self.timestamp)
    }
}

/// Checkpoint statistics of one worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointStats {
    /// Number of live checkpoints
    pub total_checkpoints: usize,
    /// Rows held across all checkpoints
    pub checkpointed_rows: usize,
    /// Owning worker
    pub worker_id: WorkerId,
    /// Configured failure probability
    pub failure_probability: f64,
}

/// Per-worker checkpoint store and fault simulator
pub struct FaultToleranceManager {
    /// Owning worker
    worker_id: WorkerId,
    /// Configuration
    config: FaultConfig,
    /// Source of simulated failures and delays
    injector: Arc<dyn FaultInjector>,
    /// One live checkpoint per task
    checkpoints: DashMap<TaskId, CheckpointInfo>,
}

impl FaultToleranceManager {
    /// Create a fault manager using random fault injection
    pub fn new(worker_id: WorkerId, config: FaultConfig) -> Self {
        Self::with_injector(worker_id, config, Arc::new(RandomFaultInjector))
    }

    /// Create a fault manager with a custom injector
    pub fn with_injector(
        worker_id: WorkerId,
        config: FaultConfig,
        injector: Arc<dyn FaultInjector>,
    ) -> Self {
        Self {
            worker_id,
            config,
            injector,
            checkpoints: DashMap::new(),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &FaultConfig {
        &self.config
    }

    /// Store a checkpoint for a task, replacing any previous one
    pub fn create_checkpoint(&self, task_id: &TaskId, rows: Vec<Row>, state: &str) -> CheckpointInfo {
        let checkpoint = CheckpointInfo {
            checkpoint_id: format!("checkpoint_{}", &Uuid::new_v4().to_string()[..8]),
            task_id: task_id.clone(),
            timestamp: now_millis(),
            rows,
            state: state.to_string(),
        };

        self.store_checkpoint(checkpoint.clone());
        checkpoint
    }

    /// Insert an already built checkpoint, replacing any previous one for its task
    pub fn store_checkpoint(&self, checkpoint: CheckpointInfo) {
        debug!(
            "Checkpoint {} for task {} on {}: {} rows, state {}",
            checkpoint.checkpoint_id,
            checkpoint.task_id,
            self.worker_id,
            checkpoint.rows.len(),
            checkpoint.state
        );
        self.checkpoints.insert(checkpoint.task_id.clone(), checkpoint);
    }

    /// Latest checkpoint of a task
    pub fn restore_checkpoint(&self, task_id: &TaskId) -> Option<CheckpointInfo> {
        let checkpoint = self.checkpoints.get(task_id).map(|c| c.clone());
        if let Some(cp) = &checkpoint {
            info!("Restored checkpoint {} for task {}", cp.checkpoint_id, task_id);
        }
        checkpoint
    }

    /// Roll for a simulated task failure
    pub fn simulate_failure(&self) -> bool {
        let failed = self.injector.should_fail(self.config.failure_probability);
        if failed {
            warn!("Simulated failure on worker {}", self.worker_id);
        }
        failed
    }

    /// Sleep for a simulated network delay, suspending only the calling task
    pub async fn simulate_network_delay(&self) -> Duration {
        let delay = self.injector.network_delay(
            Duration::from_millis(self.config.min_delay_ms),
            Duration::from_millis(self.config.max_delay_ms),
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        delay
    }

    /// Drop checkpoints whose age is at least `max_age`. Returns how many went.
    pub fn cleanup_old_checkpoints(&self, max_age: Duration) -> usize {
        let max_age_ms = max_age.as_millis() as u64;
        let mut removed = 0;
        self.checkpoints.retain(|_, cp| {
            let keep = cp.age_ms() < max_age_ms;
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            info!("Cleaned up {} checkpoints on {}", removed, self.worker_id);
        }
        removed
    }

    /// Drop checkpoints older than the configured maximum age
    pub fn cleanup_expired_checkpoints(&self) -> usize {
        self.cleanup_old_checkpoints(self.config.max_checkpoint_age())
    }

    /// Number of live checkpoints
    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }

    /// Checkpoint statistics
    pub fn checkpoint_stats(&self) -> CheckpointStats {
        CheckpointStats {
            total_checkpoints: self.checkpoints.len(),
            checkpointed_rows: self.checkpoints.iter().map(|c| c.rows.len()).sum(),
            worker_id: self.worker_id.clone(),
            failure_probability: self.config.failure_probability,
        }
    }
}
