//! Network communication for distributed execution
//!
//! Request/response messages exchanged between clients, the coordinator and
//! workers, plus the transport traits the coordinator talks through. Only an
//! in-process transport is provided.

use crate::error::{DistributedError, Result};
use crate::fault::CheckpointInfo;
use crate::worker::Worker;
use async_trait::async_trait;
use dashmap::DashMap;
use dsql_core::{PlanNode, QueryId, QueryStatus, ResultSet, Row, TaskId, WorkerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Run a SQL query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteQueryRequest {
    /// SQL text
    pub sql: String,
    /// Caller-chosen query ID, generated when absent
    pub query_id: Option<String>,
}

impl ExecuteQueryRequest {
    /// Request with a generated query ID
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            query_id: None,
        }
    }
}

/// Query result as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResultPayload {
    /// Query ID
    pub query_id: String,
    /// Original SQL
    pub sql: String,
    /// Column names
    pub column_names: Vec<String>,
    /// Result rows
    pub rows: Vec<Row>,
    /// Number of rows
    pub rows_returned: usize,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
    /// Final status
    pub status: QueryStatus,
}

impl QueryResultPayload {
    /// Build from a result set
    pub fn from_result_set(sql: &str, result: ResultSet) -> Self {
        Self {
            query_id: result.query_id.to_string(),
            sql: sql.to_string(),
            rows_returned: result.rows.len(),
            column_names: result.column_names,
            rows: result.rows,
            execution_time_ms: result.execution_time_ms,
            status: result.status,
        }
    }
}

/// Response to [`ExecuteQueryRequest`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteQueryResponse {
    /// Whether the query produced a result
    pub success: bool,
    /// Result, present whenever execution was attempted
    pub result: Option<QueryResultPayload>,
    /// Human-readable outcome
    pub message: String,
}

/// Announce a worker to the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterWorkerRequest {
    /// Worker ID
    pub worker_id: String,
    /// Host name or IP
    pub address: String,
    /// RPC port
    pub port: u16,
}

/// Response to [`RegisterWorkerRequest`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterWorkerResponse {
    /// Whether registration succeeded
    pub success: bool,
    /// Human-readable outcome
    pub message: String,
}

/// Periodic liveness and load report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    /// Worker ID
    pub worker_id: String,
    /// CPU usage (percent)
    pub cpu_usage: f64,
    /// Memory usage (percent)
    pub memory_usage: f64,
    /// Tasks currently running on the worker
    pub active_queries: u32,
}

/// Response to [`HeartbeatRequest`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    /// False for unknown workers
    pub success: bool,
    /// Human-readable outcome
    pub message: String,
}

/// Health of one component in the system status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentStatus {
    /// `HEALTHY` or `UNHEALTHY`
    pub status: String,
    /// CPU usage (percent)
    pub cpu_usage: f64,
    /// Memory usage (percent)
    pub memory_usage: f64,
    /// Active queries or tasks
    pub active_connections: u32,
    /// Last heartbeat (Unix millis)
    pub last_heartbeat: u64,
}

/// Coordinator-wide status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatusResponse {
    /// Successful queries since start
    pub total_queries: u64,
    /// Queries currently executing
    pub active_queries: u64,
    /// Seconds since the coordinator started
    pub uptime_seconds: u64,
    /// Component id -> status
    pub components: BTreeMap<String, ComponentStatus>,
}

/// Outcome of a worker task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Task produced rows
    TaskCompleted,
    /// Task failed; see the error message
    TaskFailed,
}

/// Run a plan tree on a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteTaskRequest {
    /// Task ID
    pub task_id: TaskId,
    /// Parent query
    pub query_id: QueryId,
    /// Plan tree stamped for the target worker
    pub plan_node: PlanNode,
    /// Target worker
    pub worker_id: WorkerId,
}

/// Response to [`ExecuteTaskRequest`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteTaskResponse {
    /// Outcome
    pub status: TaskStatus,
    /// Column names of `rows`
    pub column_names: Vec<String>,
    /// Result rows
    pub rows: Vec<Row>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
    /// Checkpoint taken after completion
    pub checkpoint: Option<CheckpointInfo>,
    /// Error message (if failed)
    pub error_message: Option<String>,
}

impl ExecuteTaskResponse {
    /// Create a success response
    pub fn completed(
        column_names: Vec<String>,
        rows: Vec<Row>,
        execution_time_ms: u64,
        checkpoint: Option<CheckpointInfo>,
    ) -> Self {
        Self {
            status: TaskStatus::TaskCompleted,
            column_names,
            rows,
            execution_time_ms,
            checkpoint,
            error_message: None,
        }
    }

    /// Create a failure response
    pub fn failed(error: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            status: TaskStatus::TaskFailed,
            column_names: Vec::new(),
            rows: Vec::new(),
            execution_time_ms,
            checkpoint: None,
            error_message: Some(error.into()),
        }
    }
}

/// Push a checkpoint to a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRequest {
    /// Checkpoint ID
    pub checkpoint_id: String,
    /// JSON-encoded [`CheckpointInfo`]
    pub payload: Vec<u8>,
}

impl CheckpointRequest {
    /// Encode a checkpoint
    pub fn from_checkpoint(checkpoint: &CheckpointInfo) -> Result<Self> {
        let payload = serde_json::to_vec(checkpoint)
            .map_err(|e| DistributedError::TransportError(e.to_string()))?;
        Ok(Self {
            checkpoint_id: checkpoint.checkpoint_id.clone(),
            payload,
        })
    }
}

/// Response to [`CheckpointRequest`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointResponse {
    /// Whether the checkpoint was stored
    pub success: bool,
    /// Error message (if failed)
    pub error_message: Option<String>,
}

/// Probe a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckRequest {
    /// Worker ID
    pub worker_id: String,
}

/// Response to [`HealthCheckRequest`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    /// Whether the worker accepts tasks
    pub healthy: bool,
    /// Human-readable status
    pub status_message: String,
    /// Response time (Unix millis)
    pub timestamp: u64,
}

/// Coordinator-side handle to one worker
#[async_trait]
pub trait WorkerClient: Send + Sync {
    /// Run a task on the worker
    async fn execute_task(&self, request: ExecuteTaskRequest) -> Result<ExecuteTaskResponse>;

    /// Store a checkpoint on the worker
    async fn checkpoint(&self, request: CheckpointRequest) -> Result<CheckpointResponse>;

    /// Probe the worker
    async fn health_check(&self, request: HealthCheckRequest) -> Result<HealthCheckResponse>;
}

/// Opens clients for newly registered workers
#[async_trait]
pub trait WorkerConnector: Send + Sync {
    /// Connect to the worker at `address:port`
    async fn connect(
        &self,
        worker_id: &WorkerId,
        address: &str,
        port: u16,
    ) -> Result<Arc<dyn WorkerClient>>;
}

/// Client calling a [`Worker`] in the same process
pub struct LocalWorkerClient {
    worker: Arc<Worker>,
}

impl LocalWorkerClient {
    /// Wrap a worker
    pub fn new(worker: Arc<Worker>) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl WorkerClient for LocalWorkerClient {
    async fn execute_task(&self, request: ExecuteTaskRequest) -> Result<ExecuteTaskResponse> {
        Ok(self.worker.execute_task(request).await)
    }

    async fn checkpoint(&self, request: CheckpointRequest) -> Result<CheckpointResponse> {
        Ok(self.worker.checkpoint(request))
    }

    async fn health_check(&self, request: HealthCheckRequest) -> Result<HealthCheckResponse> {
        Ok(self.worker.health_check(request))
    }
}

/// Connector resolving worker ids to in-process workers
#[derive(Default)]
pub struct LocalConnector {
    workers: DashMap<WorkerId, Arc<Worker>>,
}

impl LocalConnector {
    /// Create an empty connector
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a worker reachable
    pub fn add_worker(&self, worker: Arc<Worker>) {
        self.workers.insert(worker.id().clone(), worker);
    }
}

#[async_trait]
impl WorkerConnector for LocalConnector {
    async fn connect(
        &self,
        worker_id: &WorkerId,
        _address: &str,
        _port: u16,
    ) -> Result<Arc<dyn WorkerClient>> {
        let worker = self
            .workers
            .get(worker_id)
            .map(|w| Arc::clone(w.value()))
            .ok_or_else(|| DistributedError::WorkerNotFound(worker_id.to_string()))?;
        Ok(Arc::new(LocalWorkerClient::new(worker)))
    }
}

/// Worker id -> client
#[derive(Default)]
pub struct WorkerClientRegistry {
    clients: DashMap<WorkerId, Arc<dyn WorkerClient>>,
}

impl WorkerClientRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the client of a worker
    pub fn register(&self, worker_id: WorkerId, client: Arc<dyn WorkerClient>) {
        self.clients.insert(worker_id, client);
    }

    /// Client of a worker
    pub fn get(&self, worker_id: &WorkerId) -> Option<Arc<dyn WorkerClient>> {
        self.clients.get(worker_id).map(|c| Arc::clone(c.value()))
    }

    /// Forget a worker's client
    pub fn remove(&self, worker_id: &WorkerId) -> bool {
        self.clients.remove(worker_id).is_some()
    }

    /// Number of clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// True when no clients are registered
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
