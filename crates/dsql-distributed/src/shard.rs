//! Shard metadata and worker membership
//!
//! The shard manager is the coordinator's view of which worker owns which
//! slice of which table, plus the latest heartbeat reported by every worker.

use crate::types::{ClusterConfig, ShardInfo, WorkerInfo};
use dashmap::DashMap;
use dsql_core::WorkerId;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// Table-to-shard map and worker registry
pub struct ShardManager {
    /// table -> shards in insertion order
    shards: DashMap<String, Vec<ShardInfo>>,
    /// worker id -> last known state
    workers: DashMap<WorkerId, WorkerInfo>,
    /// Heartbeat age at which a worker stops being healthy
    heartbeat_timeout: Duration,
}

impl ShardManager {
    /// Create an empty shard manager
    pub fn new(config: &ClusterConfig) -> Self {
        Self {
            shards: DashMap::new(),
            workers: DashMap::new(),
            heartbeat_timeout: config.heartbeat_timeout(),
        }
    }

    /// Create with default configuration and no shards
    pub fn with_defaults() -> Self {
        Self::new(&ClusterConfig::default())
    }

    /// Create with default configuration and the default shard layout
    pub fn with_default_shards() -> Self {
        let manager = Self::with_defaults();
        for shard in default_shards() {
            manager.add_shard(shard);
        }
        manager
    }

    /// Register a worker, replacing address and port if already known
    pub fn register_worker(&self, worker_id: WorkerId, address: &str, port: u16) {
        self.workers
            .entry(worker_id.clone())
            .and_modify(|info| {
                info.address = address.to_string();
                info.port = port;
            })
            .or_insert_with(|| WorkerInfo::new(worker_id.clone(), address, port));

        info!("Registered worker {} at {}:{}", worker_id, address, port);
    }

    /// Record a heartbeat. Returns false for unknown workers.
    ///
    /// All gauges and the timestamp are replaced while the entry is locked,
    /// so readers never see a partially applied heartbeat.
    pub fn update_heartbeat(
        &self,
        worker_id: &WorkerId,
        cpu_usage: f64,
        memory_usage: f64,
        active_queries: u32,
    ) -> bool {
        match self.workers.get_mut(worker_id) {
            Some(mut info) => {
                info.cpu_usage = cpu_usage;
                info.memory_usage = memory_usage;
                info.active_queries = active_queries;
                info.last_heartbeat = crate::types::now_millis();
                debug!(
                    "Heartbeat from {}: cpu={:.1}% mem={:.1}% active={}",
                    worker_id, cpu_usage, memory_usage, active_queries
                );
                true
            }
            None => false,
        }
    }

    /// Remove a worker from the registry
    pub fn remove_worker(&self, worker_id: &WorkerId) -> Option<WorkerInfo> {
        let removed = self.workers.remove(worker_id).map(|(_, info)| info);
        if removed.is_some() {
            info!("Removed worker {}", worker_id);
        }
        removed
    }

    /// Append a shard to its table's list
    pub fn add_shard(&self, shard: ShardInfo) {
        debug!(
            "Added shard {} of {} on {}",
            shard.shard_id, shard.table_name, shard.worker_id
        );
        self.shards
            .entry(shard.table_name.clone())
            .or_default()
            .push(shard);
    }

    /// Shards of a table, empty for unknown tables
    pub fn get_shards_for_table(&self, table: &str) -> Vec<ShardInfo> {
        self.shards
            .get(table)
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Every shard owned by a worker, ordered by shard id
    pub fn get_worker_shards(&self, worker_id: &WorkerId) -> Vec<ShardInfo> {
        let mut shards: Vec<ShardInfo> = self
            .shards
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|s| &s.worker_id == worker_id)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        shards.sort_by(|a, b| a.shard_id.cmp(&b.shard_id));
        shards
    }

    /// table -> distinct owning workers in first-seen order
    pub fn shard_distribution(&self) -> BTreeMap<String, Vec<WorkerId>> {
        self.shards
            .iter()
            .map(|entry| {
                let mut owners: Vec<WorkerId> = Vec::new();
                for shard in entry.value() {
                    if !owners.contains(&shard.worker_id) {
                        owners.push(shard.worker_id.clone());
                    }
                }
                (entry.key().clone(), owners)
            })
            .collect()
    }

    /// Sum of the row counts of a table's shards
    pub fn table_row_count(&self, table: &str) -> u64 {
        self.shards
            .get(table)
            .map(|s| s.iter().map(|shard| shard.row_count).sum())
            .unwrap_or(0)
    }

    /// Sum of all shard row counts
    pub fn total_rows(&self) -> u64 {
        self.shards
            .iter()
            .map(|entry| entry.value().iter().map(|s| s.row_count).sum::<u64>())
            .sum()
    }

    /// Tables with at least one shard, sorted
    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self.shards.iter().map(|e| e.key().clone()).collect();
        tables.sort();
        tables
    }

    /// False for unknown workers or a heartbeat older than the timeout
    pub fn is_worker_healthy(&self, worker_id: &WorkerId) -> bool {
        self.workers
            .get(worker_id)
            .map(|info| info.is_healthy(self.heartbeat_timeout))
            .unwrap_or(false)
    }

    /// Snapshot of every registered worker, ordered by id
    pub fn get_active_workers(&self) -> Vec<WorkerInfo> {
        let mut workers: Vec<WorkerInfo> = self.workers.iter().map(|w| w.clone()).collect();
        workers.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        workers
    }

    /// Snapshot of one worker
    pub fn get_worker(&self, worker_id: &WorkerId) -> Option<WorkerInfo> {
        self.workers.get(worker_id).map(|w| w.clone())
    }

    /// Number of registered workers
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Heartbeat timeout in effect
    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }
}

impl Default for ShardManager {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Seed layout: users on two workers, orders and products on three
pub fn default_shards() -> Vec<ShardInfo> {
    vec![
        ShardInfo::new("users_shard_1", "worker1", "users", "A", "M", 1000),
        ShardInfo::new("users_shard_2", "worker2", "users", "N", "Z", 1200),
        ShardInfo::new("orders_shard_1", "worker1", "orders", "1", "5000", 5000),
        ShardInfo::new("orders_shard_2", "worker2", "orders", "5001", "10000", 5000),
        ShardInfo::new("orders_shard_3", "worker3", "orders", "10001", "15000", 5000),
        ShardInfo::new("products_shard_1", "worker1", "products", "Electronics", "Electronics", 5),
        ShardInfo::new("products_shard_2", "worker2", "products", "Appliances", "Appliances", 3),
        ShardInfo::new("products_shard_3", "worker3", "products", "Sports", "Accessories", 7),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn worker(id: &str) -> WorkerId {
        WorkerId::from(id)
    }

    #[test]
    fn test_default_shards() {
        let manager = ShardManager::with_default_shards();

        assert_eq!(manager.get_shards_for_table("users").len(), 2);
        assert_eq!(manager.get_shards_for_table("orders").len(), 3);
        assert_eq!(manager.get_shards_for_table("products").len(), 3);
        assert!(manager.get_shards_for_table("unknown").is_empty());
        assert_eq!(manager.table_row_count("users"), 2200);
        assert_eq!(manager.total_rows(), 2200 + 15000 + 15);
    }

    #[test]
    fn test_shard_distribution() {
        let manager = ShardManager::with_default_shards();
        let distribution = manager.shard_distribution();

        assert_eq!(distribution["users"], vec![worker("worker1"), worker("worker2")]);
        assert_eq!(distribution["orders"].len(), 3);
    }

    #[test]
    fn test_worker_shards() {
        let manager = ShardManager::with_default_shards();
        let shards = manager.get_worker_shards(&worker("worker3"));

        assert_eq!(shards.len(), 2);
        assert!(shards.iter().all(|s| s.worker_id == worker("worker3")));
        assert_eq!(shards[0].shard_id, "orders_shard_3");
    }

    #[test]
    fn test_register_is_idempotent() {
        let manager = ShardManager::with_defaults();

        manager.register_worker(worker("worker1"), "localhost", 50052);
        manager.register_worker(worker("worker1"), "10.0.0.5", 50060);

        assert_eq!(manager.worker_count(), 1);
        let info = manager.get_worker(&worker("worker1")).unwrap();
        assert_eq!(info.endpoint(), "10.0.0.5:50060");
    }

    #[test]
    fn test_heartbeat_unknown_worker_is_noop() {
        let manager = ShardManager::with_defaults();
        assert!(!manager.update_heartbeat(&worker("ghost"), 10.0, 20.0, 1));
        assert_eq!(manager.worker_count(), 0);
    }

    #[test]
    fn test_health_follows_heartbeat_age() {
        let manager = ShardManager::with_defaults();
        let id = worker("worker1");
        manager.register_worker(id.clone(), "localhost", 50052);

        manager.workers.get_mut(&id).unwrap().last_heartbeat -= 31_000;
        assert!(!manager.is_worker_healthy(&id));

        assert!(manager.update_heartbeat(&id, 42.0, 55.0, 2));
        assert!(manager.is_worker_healthy(&id));

        let info = manager.get_worker(&id).unwrap();
        assert_eq!(info.cpu_usage, 42.0);
        assert_eq!(info.active_queries, 2);

        assert!(!manager.is_worker_healthy(&worker("unknown")));
    }

    #[test]
    fn test_remove_worker() {
        let manager = ShardManager::with_defaults();
        manager.register_worker(worker("worker1"), "localhost", 50052);

        assert!(manager.remove_worker(&worker("worker1")).is_some());
        assert!(manager.remove_worker(&worker("worker1")).is_none());
        assert!(!manager.is_worker_healthy(&worker("worker1")));
    }

    #[test]
    fn test_concurrent_heartbeats_are_consistent() {
        let manager = Arc::new(ShardManager::with_defaults());
        let id = worker("worker1");
        manager.register_worker(id.clone(), "localhost", 50052);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let manager = Arc::clone(&manager);
                let id = id.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let v = i as f64;
                        manager.update_heartbeat(&id, v, v, i);
                        let snapshot = manager.get_worker(&id).unwrap();
                        assert_eq!(snapshot.cpu_usage, snapshot.memory_usage);
                        assert_eq!(snapshot.cpu_usage as u32, snapshot.active_queries);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
