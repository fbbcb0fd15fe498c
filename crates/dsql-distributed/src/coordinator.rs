//! Coordinator node for distributed query execution
//!
//! Owns the parser, planner, shard metadata and orchestrator, and exposes the
//! client- and worker-facing request handlers. Handlers never fail: every
//! error is turned into an unsuccessful response.

use crate::error::{DistributedError, Result};
use crate::executor::{OrchestratorConfig, QueryOrchestrator};
use crate::metrics::{MetricsProvider, SimulatedMetrics};
use crate::network::{
    ComponentStatus, ExecuteQueryRequest, ExecuteQueryResponse, HealthCheckRequest,
    HeartbeatRequest, HeartbeatResponse, QueryResultPayload, RegisterWorkerRequest,
    RegisterWorkerResponse, SystemStatusResponse, WorkerClientRegistry, WorkerConnector,
};
use crate::planner::{CostModel, QueryPlanner};
use crate::shard::ShardManager;
use crate::types::{now_millis, ClusterConfig};
use dsql_core::{QueryId, QueryPlan, ResultSet, WorkerId};
use dsql_parser::SqlParser;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Component key of the coordinator in [`SystemStatusResponse`]
pub const COORDINATOR_COMPONENT: &str = "coordinator";

/// Coordinator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Heartbeat settings
    pub cluster: ClusterConfig,
    /// Dispatch settings
    pub orchestrator: OrchestratorConfig,
    /// Cost estimate weights
    pub cost_model: CostModel,
}

/// Coordinator node that plans queries and fans them out to workers
pub struct Coordinator {
    /// SQL parser
    parser: SqlParser,
    /// Plan builder
    planner: QueryPlanner,
    /// Shard and worker metadata
    shard_manager: Arc<ShardManager>,
    /// Dispatch and aggregation
    orchestrator: QueryOrchestrator,
    /// Transport handles per worker
    clients: Arc<WorkerClientRegistry>,
    /// Opens clients for newly registered workers
    connector: Option<Arc<dyn WorkerConnector>>,
    /// Coordinator resource gauges
    metrics: Arc<dyn MetricsProvider>,
    /// Start time
    started: Instant,
}

impl Coordinator {
    /// Create a coordinator over existing shard metadata
    pub fn new(config: CoordinatorConfig, shard_manager: Arc<ShardManager>) -> Self {
        let clients = Arc::new(WorkerClientRegistry::new());
        Self {
            parser: SqlParser::new(),
            planner: QueryPlanner::new(Arc::clone(&shard_manager), config.cost_model),
            orchestrator: QueryOrchestrator::new(config.orchestrator, Arc::clone(&clients)),
            shard_manager,
            clients,
            connector: None,
            metrics: Arc::new(SimulatedMetrics::default()),
            started: Instant::now(),
        }
    }

    /// Create with default configuration and the default shard layout
    pub fn with_defaults() -> Self {
        Self::new(
            CoordinatorConfig::default(),
            Arc::new(ShardManager::with_default_shards()),
        )
    }

    /// Use `connector` to reach workers that register
    pub fn with_connector(mut self, connector: Arc<dyn WorkerConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Report coordinator gauges from `metrics`
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsProvider>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Get shard metadata
    pub fn shard_manager(&self) -> &Arc<ShardManager> {
        &self.shard_manager
    }

    /// Get the orchestrator
    pub fn orchestrator(&self) -> &QueryOrchestrator {
        &self.orchestrator
    }

    /// Get the worker client registry
    pub fn clients(&self) -> &Arc<WorkerClientRegistry> {
        &self.clients
    }

    /// Parse and plan without executing
    pub fn explain(&self, sql: &str) -> Result<QueryPlan> {
        let query = self.parser.parse(sql)?;
        Ok(self.planner.create_plan(&query)?)
    }

    /// Parse, plan and execute a query
    pub async fn query(&self, sql: &str) -> Result<ResultSet> {
        self.run(sql, None).await.map(|(_, result)| result)
    }

    async fn run(&self, sql: &str, query_id: Option<&str>) -> Result<(QueryPlan, ResultSet)> {
        let mut query = self.parser.parse(sql)?;
        if let Some(id) = query_id {
            query = query.with_id(QueryId::from(id));
        }
        info!("Parsed query {}: {}", query.id, sql);

        let plan = self.planner.create_plan(&query)?;
        let result = self.orchestrator.execute(&query, &plan).await?;
        Ok((plan, result))
    }

    /// Handle `ExecuteQuery`
    pub async fn execute_query(&self, request: ExecuteQueryRequest) -> ExecuteQueryResponse {
        match self.run(&request.sql, request.query_id.as_deref()).await {
            Ok((_, result)) if result.is_success() => {
                let message = format!("Query returned {} rows", result.total_rows());
                ExecuteQueryResponse {
                    success: true,
                    result: Some(QueryResultPayload::from_result_set(&request.sql, result)),
                    message,
                }
            }
            Ok((plan, result)) => {
                let err = DistributedError::AllTasksFailed(plan.worker_ids.len());
                error!("Query {} error: {}", result.query_id, err);
                ExecuteQueryResponse {
                    success: false,
                    result: Some(QueryResultPayload::from_result_set(&request.sql, result)),
                    message: err.to_string(),
                }
            }
            Err(e) => {
                error!("Query error: {}", e);
                ExecuteQueryResponse {
                    success: false,
                    result: None,
                    message: e.to_string(),
                }
            }
        }
    }

    /// Handle `RegisterWorker`
    pub async fn register_worker(&self, request: RegisterWorkerRequest) -> RegisterWorkerResponse {
        let worker_id = WorkerId::from(request.worker_id);

        if let Some(connector) = &self.connector {
            match connector
                .connect(&worker_id, &request.address, request.port)
                .await
            {
                Ok(client) => self.clients.register(worker_id.clone(), client),
                Err(e) => {
                    warn!("Could not connect to worker {}: {}", worker_id, e);
                    return RegisterWorkerResponse {
                        success: false,
                        message: e.to_string(),
                    };
                }
            }
        }

        self.shard_manager
            .register_worker(worker_id.clone(), &request.address, request.port);

        RegisterWorkerResponse {
            success: true,
            message: format!("Worker {} registered", worker_id),
        }
    }

    /// Forget a worker and its client
    pub fn unregister_worker(&self, worker_id: &WorkerId) -> bool {
        self.clients.remove(worker_id);
        let removed = self.shard_manager.remove_worker(worker_id).is_some();
        if removed {
            info!("Unregistered worker {}", worker_id);
        }
        removed
    }

    /// Handle `Heartbeat`
    pub fn heartbeat(&self, request: HeartbeatRequest) -> HeartbeatResponse {
        let worker_id = WorkerId::from(request.worker_id);
        let updated = self.shard_manager.update_heartbeat(
            &worker_id,
            request.cpu_usage,
            request.memory_usage,
            request.active_queries,
        );

        if updated {
            HeartbeatResponse {
                success: true,
                message: "Heartbeat received".to_string(),
            }
        } else {
            warn!("Heartbeat from unknown worker {}", worker_id);
            HeartbeatResponse {
                success: false,
                message: DistributedError::WorkerNotFound(worker_id.to_string()).to_string(),
            }
        }
    }

    /// Handle `GetSystemStatus`
    pub fn system_status(&self) -> SystemStatusResponse {
        let mut components = BTreeMap::new();
        components.insert(
            COORDINATOR_COMPONENT.to_string(),
            ComponentStatus {
                status: "HEALTHY".to_string(),
                cpu_usage: self.metrics.cpu_usage(),
                memory_usage: self.metrics.memory_usage(),
                active_connections: self.clients.len() as u32,
                last_heartbeat: now_millis(),
            },
        );

        let timeout = self.shard_manager.heartbeat_timeout();
        for worker in self.shard_manager.get_active_workers() {
            let status = if worker.is_healthy(timeout) {
                "HEALTHY"
            } else {
                "UNHEALTHY"
            };
            components.insert(
                worker.worker_id.to_string(),
                ComponentStatus {
                    status: status.to_string(),
                    cpu_usage: worker.cpu_usage,
                    memory_usage: worker.memory_usage,
                    active_connections: worker.active_queries,
                    last_heartbeat: worker.last_heartbeat,
                },
            );
        }

        SystemStatusResponse {
            total_queries: self.orchestrator.total_queries(),
            active_queries: self.orchestrator.active_queries(),
            uptime_seconds: self.started.elapsed().as_secs(),
            components,
        }
    }

    /// Heartbeat fresh and the worker answers a health probe
    pub async fn check_worker_health(&self, worker_id: &WorkerId) -> bool {
        if !self.shard_manager.is_worker_healthy(worker_id) {
            return false;
        }
        let Some(client) = self.clients.get(worker_id) else {
            return false;
        };

        let request = HealthCheckRequest {
            worker_id: worker_id.to_string(),
        };
        match client.health_check(request).await {
            Ok(response) => response.healthy,
            Err(e) => {
                warn!("Health check of {} failed: {}", worker_id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::FixedMetrics;

    fn coordinator() -> Coordinator {
        Coordinator::with_defaults().with_metrics(Arc::new(FixedMetrics {
            cpu: 20.0,
            memory: 50.0,
        }))
    }

    fn register(worker_id: &str) -> RegisterWorkerRequest {
        RegisterWorkerRequest {
            worker_id: worker_id.to_string(),
            address: "localhost".to_string(),
            port: 50052,
        }
    }

    #[tokio::test]
    async fn test_parse_error_is_a_failed_response() {
        let response = coordinator()
            .execute_query(ExecuteQueryRequest::new("SELEC * FROM users"))
            .await;
        assert!(!response.success);
        assert!(response.result.is_none());
        assert!(response.message.contains("Parse error"));
    }

    #[tokio::test]
    async fn test_planning_error_is_a_failed_response() {
        let response = coordinator()
            .execute_query(ExecuteQueryRequest::new("SELECT * FROM users, orders"))
            .await;
        assert!(!response.success);
        assert!(response.message.contains("JOIN"));
    }

    #[tokio::test]
    async fn test_unreachable_workers_fail_every_task() {
        let coordinator = coordinator();
        let response = coordinator
            .execute_query(ExecuteQueryRequest {
                sql: "SELECT * FROM users".to_string(),
                query_id: Some("query_fixed".to_string()),
            })
            .await;

        assert!(!response.success);
        assert_eq!(response.message, "All 2 tasks failed");
        let payload = response.result.unwrap();
        assert_eq!(payload.query_id, "query_fixed");
        assert_eq!(payload.rows_returned, 0);
        assert_eq!(coordinator.system_status().total_queries, 0);
    }

    #[tokio::test]
    async fn test_register_and_heartbeat() {
        let coordinator = coordinator();
        assert!(coordinator.register_worker(register("worker1")).await.success);

        let heartbeat = coordinator.heartbeat(HeartbeatRequest {
            worker_id: "worker1".to_string(),
            cpu_usage: 33.0,
            memory_usage: 44.0,
            active_queries: 2,
        });
        assert!(heartbeat.success);

        let info = coordinator
            .shard_manager()
            .get_worker(&WorkerId::from("worker1"))
            .unwrap();
        assert_eq!(info.active_queries, 2);

        let unknown = coordinator.heartbeat(HeartbeatRequest {
            worker_id: "ghost".to_string(),
            cpu_usage: 0.0,
            memory_usage: 0.0,
            active_queries: 0,
        });
        assert!(!unknown.success);
    }

    #[tokio::test]
    async fn test_register_without_reachable_worker() {
        let coordinator = coordinator().with_connector(Arc::new(crate::network::LocalConnector::new()));
        let response = coordinator.register_worker(register("worker1")).await;
        assert!(!response.success);
        assert_eq!(coordinator.shard_manager().worker_count(), 0);
    }

    #[tokio::test]
    async fn test_system_status() {
        let coordinator = coordinator();
        coordinator.register_worker(register("worker1")).await;

        let status = coordinator.system_status();
        let own = &status.components[COORDINATOR_COMPONENT];
        assert_eq!(own.status, "HEALTHY");
        assert_eq!(own.cpu_usage, 20.0);
        assert_eq!(status.components["worker1"].status, "HEALTHY");
        assert_eq!(status.active_queries, 0);
    }

    #[tokio::test]
    async fn test_health_without_client() {
        let coordinator = coordinator();
        coordinator.register_worker(register("worker1")).await;
        assert!(!coordinator.check_worker_health(&WorkerId::from("worker1")).await);
        assert!(coordinator.unregister_worker(&WorkerId::from("worker1")));
    }

    #[test]
    fn test_explain() {
        let plan = coordinator()
            .explain("SELECT name FROM users WHERE age > 30")
            .unwrap();
        assert_eq!(plan.root.node_type, dsql_core::NodeType::Project);
        assert_eq!(plan.worker_ids.len(), 2);
    }
}
