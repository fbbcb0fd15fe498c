use anyhow::{Context, Result};
use dsql_core::SchemaRegistry;
use dsql_distributed::cluster::default_workers;
use dsql_distributed::shard::default_shards;
use dsql_distributed::{
    ClusterConfig, CoordinatorConfig, OrchestratorConfig, PartitionMode, ShardInfo, WorkerConfig,
};
use dsql_storage::{demo, CsvTableLoader, MemoryRowStore, RowStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub workers: Vec<WorkerConfig>,
    pub shards: Vec<ShardInfo>,
    /// Column layouts registered on top of whatever the data source provides
    pub schemas: BTreeMap<String, Vec<String>>,
    /// Directory of `<table>.csv` files; the demo dataset is used when unset
    pub data_dir: Option<PathBuf>,
    pub query_timeout_ms: u64,
    pub max_concurrent_tasks: usize,
    pub failure_probability: f64,
    pub heartbeat_interval_ms: u64,
    /// Slice every table into this many ordinal ranges, one per worker
    pub partitions: Option<usize>,
    pub max_rows: usize,
    pub show_plan: bool,
}

impl Default for Config {
    fn default() -> Self {
        let orchestrator = OrchestratorConfig::default();
        let cluster = ClusterConfig::default();
        Self {
            workers: default_workers(),
            shards: default_shards(),
            schemas: BTreeMap::new(),
            data_dir: None,
            query_timeout_ms: orchestrator.query_timeout_ms,
            max_concurrent_tasks: orchestrator.max_concurrent_tasks,
            failure_probability: 0.10,
            heartbeat_interval_ms: cluster.heartbeat_interval_ms,
            partitions: None,
            max_rows: 1000,
            show_plan: false,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            cluster: ClusterConfig {
                heartbeat_interval_ms: self.heartbeat_interval_ms,
                ..ClusterConfig::default()
            },
            orchestrator: OrchestratorConfig {
                query_timeout_ms: self.query_timeout_ms,
                max_concurrent_tasks: self.max_concurrent_tasks,
            },
            ..CoordinatorConfig::default()
        }
    }

    /// Worker configs with the global fault and partition settings applied
    pub fn worker_configs(&self) -> Vec<WorkerConfig> {
        self.workers
            .iter()
            .cloned()
            .map(|mut worker| {
                worker.fault.failure_probability = self.failure_probability;
                if let Some(partitions) = self.partitions {
                    worker.engine.partition_mode = PartitionMode::Simulated { partitions };
                }
                worker
            })
            .collect()
    }

    pub fn load_data(&self) -> Result<(Arc<dyn RowStore>, Arc<SchemaRegistry>)> {
        let store = MemoryRowStore::new();
        let schemas = SchemaRegistry::new();

        match &self.data_dir {
            Some(dir) => {
                CsvTableLoader::new(dir)
                    .load_all(&store, &schemas)
                    .with_context(|| format!("Failed to load tables from {}", dir.display()))?;
            }
            None => demo::load(&store, &schemas),
        }

        for (table, columns) in &self.schemas {
            schemas.register(table.as_str(), columns.clone());
        }

        let store: Arc<dyn RowStore> = Arc::new(store);
        Ok((store, Arc::new(schemas)))
    }
}
