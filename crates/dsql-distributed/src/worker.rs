//! Worker node for distributed query execution

use crate::engine::{EngineConfig, ExecutionEngine};
use crate::fault::{CheckpointInfo, FaultConfig, FaultInjector, FaultToleranceManager};
use crate::metrics::MetricsProvider;
use crate::network::{
    CheckpointRequest, CheckpointResponse, ExecuteTaskRequest, ExecuteTaskResponse,
    HealthCheckRequest, HealthCheckResponse, HeartbeatRequest, TaskStatus,
};
use crate::types::now_millis;
use dsql_core::{SchemaRegistry, WorkerId};
use dsql_storage::RowStore;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Configuration of one worker node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Worker ID
    pub worker_id: WorkerId,
    /// Host name or IP
    pub address: String,
    /// RPC port
    pub port: u16,
    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,
    /// Fault simulation settings
    #[serde(default)]
    pub fault: FaultConfig,
}

impl WorkerConfig {
    /// Worker on localhost with default engine and fault settings
    pub fn new(worker_id: impl Into<WorkerId>, port: u16) -> Self {
        Self {
            worker_id: worker_id.into(),
            address: "localhost".to_string(),
            port,
            engine: EngineConfig::default(),
            fault: FaultConfig::default(),
        }
    }
}

/// Task counters of a worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    /// Tasks running now
    pub active_tasks: u32,
    /// Tasks that completed
    pub completed_tasks: u64,
    /// Tasks that failed
    pub failed_tasks: u64,
}

/// Worker node that executes plan trees against its local rows
pub struct Worker {
    /// Worker ID
    id: WorkerId,
    /// Network address
    address: String,
    /// RPC port
    port: u16,
    /// Plan interpreter
    engine: ExecutionEngine,
    /// Checkpoints and fault simulation
    fault: FaultToleranceManager,
    /// Running task count
    active_tasks: AtomicU32,
    /// Completed task count
    completed_tasks: AtomicU64,
    /// Failed task count
    failed_tasks: AtomicU64,
}

/// Keeps the active task gauge accurate on every exit path
struct ActiveTask<'a>(&'a AtomicU32);

impl<'a> ActiveTask<'a> {
    fn start(counter: &'a AtomicU32) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveTask<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Worker {
    /// Create a worker using random fault injection
    pub fn new(config: WorkerConfig, store: Arc<dyn RowStore>, schemas: Arc<SchemaRegistry>) -> Self {
        let fault = FaultToleranceManager::new(config.worker_id.clone(), config.fault.clone());
        Self::build(config, store, schemas, fault)
    }

    /// Create a worker with a custom fault injector
    pub fn with_injector(
        config: WorkerConfig,
        store: Arc<dyn RowStore>,
        schemas: Arc<SchemaRegistry>,
        injector: Arc<dyn FaultInjector>,
    ) -> Self {
        let fault = FaultToleranceManager::with_injector(
            config.worker_id.clone(),
            config.fault.clone(),
            injector,
        );
        Self::build(config, store, schemas, fault)
    }

    fn build(
        config: WorkerConfig,
        store: Arc<dyn RowStore>,
        schemas: Arc<SchemaRegistry>,
        fault: FaultToleranceManager,
    ) -> Self {
        let engine = ExecutionEngine::new(config.worker_id.clone(), store, schemas, config.engine);
        Self {
            id: config.worker_id,
            address: config.address,
            port: config.port,
            engine,
            fault,
            active_tasks: AtomicU32::new(0),
            completed_tasks: AtomicU64::new(0),
            failed_tasks: AtomicU64::new(0),
        }
    }

    /// Get worker ID
    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    /// Get worker address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Get RPC port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the fault tolerance manager
    pub fn fault_manager(&self) -> &FaultToleranceManager {
        &self.fault
    }

    /// Number of tasks running now
    pub fn active_task_count(&self) -> u32 {
        self.active_tasks.load(Ordering::SeqCst)
    }

    /// Task counters
    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            active_tasks: self.active_task_count(),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
        }
    }

    /// Execute a task. Failures are reported in the response, never returned.
    pub async fn execute_task(&self, request: ExecuteTaskRequest) -> ExecuteTaskResponse {
        let _active = ActiveTask::start(&self.active_tasks);
        let start = Instant::now();

        info!(
            "Worker {} executing task {} for query {}",
            self.id, request.task_id, request.query_id
        );

        let response = if request.worker_id != self.id {
            ExecuteTaskResponse::failed(
                format!(
                    "Task {} addressed to {} reached {}",
                    request.task_id, request.worker_id, self.id
                ),
                0,
            )
        } else {
            self.fault.cleanup_expired_checkpoints();
            self.fault.simulate_network_delay().await;
            self.run(&request, start)
        };

        match response.status {
            TaskStatus::TaskCompleted => {
                self.completed_tasks.fetch_add(1, Ordering::Relaxed);
                info!(
                    "Task {} complete on {}: {} rows in {}ms",
                    request.task_id,
                    self.id,
                    response.rows.len(),
                    response.execution_time_ms
                );
            }
            TaskStatus::TaskFailed => {
                self.failed_tasks.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Task {} failed on {}: {}",
                    request.task_id,
                    self.id,
                    response.error_message.as_deref().unwrap_or("unknown error")
                );
            }
        }

        response
    }

    fn run(&self, request: &ExecuteTaskRequest, start: Instant) -> ExecuteTaskResponse {
        if self.fault.simulate_failure() {
            return ExecuteTaskResponse::failed(
                format!("Simulated failure on worker {}", self.id),
                start.elapsed().as_millis() as u64,
            );
        }

        match self.engine.execute_plan_node(&request.plan_node) {
            Ok(batch) => {
                let checkpoint = self.fault.config().enable_checkpoints.then(|| {
                    self.fault
                        .create_checkpoint(&request.task_id, batch.rows.clone(), "COMPLETED")
                });
                ExecuteTaskResponse::completed(
                    batch.columns,
                    batch.rows,
                    start.elapsed().as_millis() as u64,
                    checkpoint,
                )
            }
            Err(e) => ExecuteTaskResponse::failed(e.to_string(), start.elapsed().as_millis() as u64),
        }
    }

    /// Store a checkpoint pushed by the coordinator
    pub fn checkpoint(&self, request: CheckpointRequest) -> CheckpointResponse {
        match serde_json::from_slice::<CheckpointInfo>(&request.payload) {
            Ok(checkpoint) => {
                self.fault.store_checkpoint(checkpoint);
                CheckpointResponse {
                    success: true,
                    error_message: None,
                }
            }
            Err(e) => CheckpointResponse {
                success: false,
                error_message: Some(format!(
                    "Invalid checkpoint {}: {}",
                    request.checkpoint_id, e
                )),
            },
        }
    }

    /// Report liveness
    pub fn health_check(&self, _request: HealthCheckRequest) -> HealthCheckResponse {
        HealthCheckResponse {
            healthy: true,
            status_message: format!(
                "Worker {} healthy, {} active tasks, {} checkpoints",
                self.id,
                self.active_task_count(),
                self.fault.checkpoint_count()
            ),
            timestamp: now_millis(),
        }
    }

    /// Build the next heartbeat
    pub fn heartbeat_request(&self, metrics: &dyn MetricsProvider) -> HeartbeatRequest {
        HeartbeatRequest {
            worker_id: self.id.to_string(),
            cpu_usage: metrics.cpu_usage(),
            memory_usage: metrics.memory_usage(),
            active_queries: self.active_task_count(),
        }
    }
}
