//! In-process cluster: one coordinator plus workers wired through the local
//! transport, sharing a row store and schema registry.

use crate::coordinator::{Coordinator, CoordinatorConfig};
use crate::error::{DistributedError, Result};
use crate::fault::FaultInjector;
use crate::metrics::{MetricsProvider, SimulatedMetrics};
use crate::network::{
    ExecuteQueryRequest, ExecuteQueryResponse, LocalConnector, RegisterWorkerRequest,
};
use crate::shard::{default_shards, ShardManager};
use crate::types::ShardInfo;
use crate::worker::{Worker, WorkerConfig};
use dsql_core::{ResultSet, SchemaRegistry, WorkerId};
use dsql_storage::{demo, MemoryRowStore, RowStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// First RPC port handed to default workers
pub const DEFAULT_WORKER_PORT: u16 = 50052;

/// Default worker set: `worker1..=worker3`
pub fn default_workers() -> Vec<WorkerConfig> {
    (1..=3u16)
        .map(|n| WorkerConfig::new(format!("worker{}", n), DEFAULT_WORKER_PORT + n - 1))
        .collect()
}

/// Builder for [`LocalCluster`]
#[derive(Default)]
pub struct LocalClusterBuilder {
    config: CoordinatorConfig,
    workers: Option<Vec<WorkerConfig>>,
    shards: Option<Vec<ShardInfo>>,
    data: Option<(Arc<dyn RowStore>, Arc<SchemaRegistry>)>,
    injector: Option<Arc<dyn FaultInjector>>,
    metrics: Option<Arc<dyn MetricsProvider>>,
    heartbeats: bool,
}

impl LocalClusterBuilder {
    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn workers(mut self, workers: Vec<WorkerConfig>) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn shards(mut self, shards: Vec<ShardInfo>) -> Self {
        self.shards = Some(shards);
        self
    }

    /// Rows and schemas shared by every worker. Defaults to the demo dataset.
    pub fn data(mut self, store: Arc<dyn RowStore>, schemas: Arc<SchemaRegistry>) -> Self {
        self.data = Some((store, schemas));
        self
    }

    /// Replace random fault injection on every worker
    pub fn fault_injector(mut self, injector: Arc<dyn FaultInjector>) -> Self {
        self.injector = Some(injector);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsProvider>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Send periodic worker heartbeats to the coordinator
    pub fn heartbeats(mut self, enabled: bool) -> Self {
        self.heartbeats = enabled;
        self
    }

    /// Start workers and register them with the coordinator
    pub async fn build(self) -> Result<LocalCluster> {
        let shard_manager = Arc::new(ShardManager::new(&self.config.cluster));
        for shard in self.shards.unwrap_or_else(default_shards) {
            shard_manager.add_shard(shard);
        }

        let (store, schemas) = match self.data {
            Some(data) => data,
            None => {
                let store = MemoryRowStore::new();
                let schemas = SchemaRegistry::new();
                demo::load(&store, &schemas);
                let store: Arc<dyn RowStore> = Arc::new(store);
                (store, Arc::new(schemas))
            }
        };

        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(SimulatedMetrics::default()));
        let connector = Arc::new(LocalConnector::new());
        let heartbeat_interval = self
            .config
            .cluster
            .heartbeat_interval()
            .max(Duration::from_millis(1));
        let coordinator = Arc::new(
            Coordinator::new(self.config, shard_manager)
                .with_connector(Arc::clone(&connector) as _)
                .with_metrics(Arc::clone(&metrics)),
        );

        let mut workers = Vec::new();
        for config in self.workers.unwrap_or_else(default_workers) {
            let request = RegisterWorkerRequest {
                worker_id: config.worker_id.to_string(),
                address: config.address.clone(),
                port: config.port,
            };
            let worker = Arc::new(match &self.injector {
                Some(injector) => Worker::with_injector(
                    config,
                    Arc::clone(&store),
                    Arc::clone(&schemas),
                    Arc::clone(injector),
                ),
                None => Worker::new(config, Arc::clone(&store), Arc::clone(&schemas)),
            });
            connector.add_worker(Arc::clone(&worker));

            let response = coordinator.register_worker(request).await;
            if !response.success {
                return Err(DistributedError::TransportError(response.message));
            }
            workers.push(worker);
        }

        let heartbeat = self.heartbeats.then(|| {
            let coordinator = Arc::clone(&coordinator);
            let workers = workers.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(heartbeat_interval);
                loop {
                    ticker.tick().await;
                    send_heartbeats(&coordinator, &workers, metrics.as_ref());
                    for worker in &workers {
                        worker.fault_manager().cleanup_expired_checkpoints();
                    }
                }
            })
        });

        info!("Local cluster started with {} workers", workers.len());
        Ok(LocalCluster {
            coordinator,
            workers,
            heartbeat,
        })
    }
}

fn send_heartbeats(coordinator: &Coordinator, workers: &[Arc<Worker>], metrics: &dyn MetricsProvider) {
    for worker in workers {
        let response = coordinator.heartbeat(worker.heartbeat_request(metrics));
        debug!("Heartbeat from {}: {}", worker.id(), response.message);
    }
}

/// A coordinator and its workers running in one process
pub struct LocalCluster {
    coordinator: Arc<Coordinator>,
    workers: Vec<Arc<Worker>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl LocalCluster {
    pub fn builder() -> LocalClusterBuilder {
        LocalClusterBuilder::default()
    }

    /// Demo data, default shards and workers, random faults
    pub async fn with_defaults() -> Result<Self> {
        Self::builder().heartbeats(true).build().await
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    pub fn worker(&self, worker_id: &WorkerId) -> Option<&Arc<Worker>> {
        self.workers.iter().find(|w| w.id() == worker_id)
    }

    /// Run a query through the coordinator
    pub async fn query(&self, sql: &str) -> Result<ResultSet> {
        self.coordinator.query(sql).await
    }

    /// Handle `ExecuteQuery` on the coordinator
    pub async fn execute_query(&self, request: ExecuteQueryRequest) -> ExecuteQueryResponse {
        self.coordinator.execute_query(request).await
    }

    /// Send one heartbeat from every worker now
    pub fn heartbeat_all(&self, metrics: &dyn MetricsProvider) {
        send_heartbeats(&self.coordinator, &self.workers, metrics);
    }

    /// Stop the heartbeat loop
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
            info!("Local cluster stopped");
        }
    }
}

impl Drop for LocalCluster {
    fn drop(&mut self) {
        self.shutdown();
    }
}
