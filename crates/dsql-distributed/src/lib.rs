//! Distributed execution for dsql
//!
//! This crate plans SQL queries against shard metadata, fans the plan out to
//! worker nodes in parallel and merges their partial results.
//!
//! # Architecture
//!
//! The distributed system consists of:
//! - **Coordinator**: Parses and plans queries, tracks workers, serves requests
//! - **QueryOrchestrator**: Dispatches one task per worker and aggregates results
//! - **Workers**: Interpret plan trees against their local rows
//! - **ShardManager**: Table-to-worker shard layout and worker heartbeats
//! - **FaultToleranceManager**: Checkpoints and simulated faults on workers
//!
//! # Example
//!
//! ```ignore
//! use dsql_distributed::LocalCluster;
//!
//! let cluster = LocalCluster::with_defaults().await?;
//! let result = cluster.query("SELECT name FROM users WHERE age > 30").await?;
//! println!("{} rows", result.total_rows());
//! ```
//!
//! # Modules
//!
//! - [`coordinator`]: Coordinator request handlers
//! - [`executor`]: Distributed dispatch and aggregation
//! - [`worker`]: Worker node implementation
//! - [`engine`]: Plan-node interpreter
//! - [`planner`]: Shard-aware query planning
//! - [`shard`]: Shard and worker metadata
//! - [`scheduler`]: Bounded task pool
//! - [`partition`]: Simulated data partitioning
//! - [`fault`]: Fault tolerance and checkpoints
//! - [`network`]: Request/response types and the transport seam
//! - [`cluster`]: In-process cluster

pub mod cluster;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod executor;
pub mod fault;
pub mod metrics;
pub mod network;
pub mod partition;
pub mod planner;
pub mod scheduler;
pub mod shard;
pub mod types;
pub mod worker;

// Re-exports
pub use cluster::{LocalCluster, LocalClusterBuilder};
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use engine::{Batch, EngineConfig, ExecutionEngine};
pub use error::{DistributedError, Result};
pub use executor::{OrchestratorConfig, QueryOrchestrator, TaskResult};
pub use fault::{
    CheckpointInfo, CheckpointStats, FaultConfig, FaultInjector, FaultToleranceManager,
    FixedFaults, NoFaults, RandomFaultInjector,
};
pub use metrics::{FixedMetrics, MetricsProvider, SimulatedMetrics};
pub use network::{
    ExecuteQueryRequest, ExecuteQueryResponse, LocalConnector, LocalWorkerClient,
    WorkerClient, WorkerClientRegistry, WorkerConnector,
};
pub use partition::PartitionMode;
pub use planner::{CostModel, QueryPlanner};
pub use scheduler::TaskScheduler;
pub use shard::ShardManager;
pub use types::*;
pub use worker::{Worker, WorkerConfig};
