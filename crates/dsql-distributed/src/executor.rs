//! Distributed query executor
//!
//! Fans a plan out to the selected workers and merges their partial results.

use crate::error::{DistributedError, Result};
use crate::network::{ExecuteTaskRequest, ExecuteTaskResponse, TaskStatus, WorkerClientRegistry};
use crate::planner::is_aggregate_plan;
use crate::scheduler::{TaskScheduler, DEFAULT_POOL_SIZE};
use dsql_core::{Query, QueryPlan, QueryStatus, ResultSet, Row, TaskId, WorkerId};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Configuration for the query orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Wall-clock limit for one query
    pub query_timeout_ms: u64,
    /// Tasks allowed in flight across all queries
    pub max_concurrent_tasks: usize,
}

impl OrchestratorConfig {
    /// Query timeout as a duration
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: 30_000,
            max_concurrent_tasks: DEFAULT_POOL_SIZE,
        }
    }
}

/// Outcome of one worker task
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// Worker that ran the task
    pub worker_id: WorkerId,
    /// Whether the task completed
    pub success: bool,
    /// Rows produced
    pub rows: Vec<Row>,
    /// Column names of `rows`
    pub column_names: Vec<String>,
    /// Time reported by the worker
    pub execution_time_ms: u64,
    /// Error message (if failed)
    pub error_message: Option<String>,
}

impl TaskResult {
    /// Convert a worker response
    pub fn from_response(worker_id: WorkerId, response: ExecuteTaskResponse) -> Self {
        Self {
            worker_id,
            success: response.status == TaskStatus::TaskCompleted,
            rows: response.rows,
            column_names: response.column_names,
            execution_time_ms: response.execution_time_ms,
            error_message: response.error_message,
        }
    }

    /// A task that never produced a response
    pub fn failed(worker_id: WorkerId, error: impl Into<String>) -> Self {
        Self {
            worker_id,
            success: false,
            rows: Vec::new(),
            column_names: Vec::new(),
            execution_time_ms: 0,
            error_message: Some(error.into()),
        }
    }
}

/// Decrements the active query gauge when a query leaves `execute`
struct ActiveQuery<'a>(&'a AtomicU64);

impl<'a> ActiveQuery<'a> {
    fn enter(gauge: &'a AtomicU64) -> Self {
        gauge.fetch_add(1, Ordering::SeqCst);
        Self(gauge)
    }
}

impl Drop for ActiveQuery<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Dispatches plans to workers and aggregates what comes back
pub struct QueryOrchestrator {
    /// Configuration
    config: OrchestratorConfig,
    /// Shared task pool
    scheduler: Arc<TaskScheduler>,
    /// Transport handles per worker
    clients: Arc<WorkerClientRegistry>,
    /// Queries currently executing
    active_queries: AtomicU64,
    /// Queries completed successfully
    total_queries: AtomicU64,
}

impl QueryOrchestrator {
    /// Create an orchestrator over the given worker clients
    pub fn new(config: OrchestratorConfig, clients: Arc<WorkerClientRegistry>) -> Self {
        let scheduler = Arc::new(TaskScheduler::new(config.max_concurrent_tasks));
        Self {
            config,
            scheduler,
            clients,
            active_queries: AtomicU64::new(0),
            total_queries: AtomicU64::new(0),
        }
    }

    /// Create with default configuration
    pub fn with_defaults(clients: Arc<WorkerClientRegistry>) -> Self {
        Self::new(OrchestratorConfig::default(), clients)
    }

    /// Get configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Get the shared task pool
    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// Queries currently executing
    pub fn active_queries(&self) -> u64 {
        self.active_queries.load(Ordering::SeqCst)
    }

    /// Queries completed successfully
    pub fn total_queries(&self) -> u64 {
        self.total_queries.load(Ordering::SeqCst)
    }

    /// Execute a plan on every selected worker and merge the results.
    ///
    /// Failed tasks are dropped from the result. When no task succeeds the
    /// returned result set has status `Failed` and no rows.
    pub async fn execute(&self, query: &Query, plan: &QueryPlan) -> Result<ResultSet> {
        let _active = ActiveQuery::enter(&self.active_queries);
        let start = Instant::now();

        if plan.worker_ids.is_empty() {
            return Err(DistributedError::NoWorkersAvailable);
        }
        plan.root.check_depth()?;

        let mut tasks = JoinSet::new();
        for worker_id in &plan.worker_ids {
            self.dispatch(&mut tasks, query, plan, worker_id);
        }

        let timeout = self.config.query_timeout();
        let expected = plan.worker_ids.len();
        let collected = tokio::time::timeout(timeout, async {
            let mut results = Vec::with_capacity(expected);
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(result) => results.push(result),
                    Err(e) => error!("Task for query {} did not finish: {}", query.id, e),
                }
            }
            results
        })
        .await;

        let results = match collected {
            Ok(results) => results,
            Err(_) => {
                tasks.abort_all();
                error!(
                    "Query {} timed out after {}ms",
                    query.id, self.config.query_timeout_ms
                );
                return Err(DistributedError::QueryTimeout(self.config.query_timeout_ms));
            }
        };

        let result_set = self.aggregate(query, plan, results);
        if result_set.is_success() {
            self.total_queries.fetch_add(1, Ordering::SeqCst);
            info!(
                "Query {} complete: {} rows in {:?}",
                query.id,
                result_set.total_rows(),
                start.elapsed()
            );
        } else {
            error!("Query {} failed on all {} workers", query.id, expected);
        }

        Ok(result_set)
    }

    fn dispatch(
        &self,
        tasks: &mut JoinSet<TaskResult>,
        query: &Query,
        plan: &QueryPlan,
        worker_id: &WorkerId,
    ) {
        let worker_id = worker_id.clone();
        let request = ExecuteTaskRequest {
            task_id: TaskId::for_worker(&query.id, &worker_id),
            query_id: query.id.clone(),
            plan_node: plan.root.stamped_for(&worker_id),
            worker_id: worker_id.clone(),
        };
        let client = self.clients.get(&worker_id);

        debug!("Dispatching task {} to {}", request.task_id, worker_id);
        self.scheduler.spawn(tasks, async move {
            let Some(client) = client else {
                return TaskResult::failed(
                    worker_id.clone(),
                    DistributedError::WorkerNotFound(worker_id.to_string()).to_string(),
                );
            };
            match client.execute_task(request).await {
                Ok(response) => TaskResult::from_response(worker_id, response),
                Err(e) => TaskResult::failed(worker_id, e.to_string()),
            }
        });
    }

    fn aggregate(&self, query: &Query, plan: &QueryPlan, results: Vec<TaskResult>) -> ResultSet {
        let mut result_set = ResultSet::new(query.id.clone());
        let mut succeeded = 0;

        for result in results {
            if !result.success {
                warn!(
                    "Task on {} failed: {}",
                    result.worker_id,
                    result.error_message.as_deref().unwrap_or("unknown error")
                );
                continue;
            }

            if succeeded == 0 {
                result_set.column_names = result.column_names;
            }
            succeeded += 1;
            result_set.execution_time_ms = result_set.execution_time_ms.max(result.execution_time_ms);
            result_set.add_rows(result.rows);
        }

        if succeeded == 0 {
            return ResultSet::failed(query.id.clone());
        }

        if is_aggregate_plan(plan) {
            let total: u64 = result_set
                .rows
                .iter()
                .filter_map(|row| row.value(0).and_then(|v| v.parse::<u64>().ok()))
                .sum();
            result_set.rows = vec![Row::new(vec![total.to_string()])];
            result_set.column_names = vec!["count".to_string()];
        }

        result_set.status = QueryStatus::Completed;
        result_set
    }
}
