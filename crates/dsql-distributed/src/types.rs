//! Core types for distributed execution

use dsql_core::WorkerId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Current wall-clock time in Unix milliseconds
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Information about a worker node as seen by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerInfo {
    /// Worker ID
    pub worker_id: WorkerId,
    /// Host name or IP
    pub address: String,
    /// RPC port
    pub port: u16,
    /// Last reported CPU usage (percent)
    pub cpu_usage: f64,
    /// Last reported memory usage (percent)
    pub memory_usage: f64,
    /// Last reported number of running queries
    pub active_queries: u32,
    /// Last heartbeat timestamp (Unix millis)
    pub last_heartbeat: u64,
}

impl WorkerInfo {
    /// Create worker info with a fresh heartbeat
    pub fn new(worker_id: WorkerId, address: impl Into<String>, port: u16) -> Self {
        Self {
            worker_id,
            address: address.into(),
            port,
            cpu_usage: 0.0,
            memory_usage: 0.0,
            active_queries: 0,
            last_heartbeat: now_millis(),
        }
    }

    /// `address:port`
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Milliseconds since the last heartbeat
    pub fn heartbeat_age_ms(&self) -> u64 {
        now_millis().saturating_sub(self.last_heartbeat)
    }

    /// Healthy iff the last heartbeat is younger than `timeout`
    pub fn is_healthy(&self, timeout: Duration) -> bool {
        (self.heartbeat_age_ms() as u128) < timeout.as_millis()
    }
}

/// A key-range slice of a table owned by one worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfo {
    /// Shard ID
    pub shard_id: String,
    /// Owning worker
    pub worker_id: WorkerId,
    /// Table this shard belongs to
    pub table_name: String,
    /// First key of the range (inclusive)
    pub start_key: String,
    /// Last key of the range (inclusive)
    pub end_key: String,
    /// Number of rows in the shard
    pub row_count: u64,
}

impl ShardInfo {
    /// Create shard info
    pub fn new(
        shard_id: impl Into<String>,
        worker_id: impl Into<WorkerId>,
        table_name: impl Into<String>,
        start_key: impl Into<String>,
        end_key: impl Into<String>,
        row_count: u64,
    ) -> Self {
        Self {
            shard_id: shard_id.into(),
            worker_id: worker_id.into(),
            table_name: table_name.into(),
            start_key: start_key.into(),
            end_key: end_key.into(),
            row_count,
        }
    }
}

/// Configuration for cluster membership
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval_ms: u64,
    /// Heartbeat age at which a worker is considered unhealthy
    pub heartbeat_timeout_ms: u64,
}

impl ClusterConfig {
    /// Heartbeat interval as a duration
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Heartbeat timeout as a duration
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 5000,  // 5 seconds
            heartbeat_timeout_ms: 30000, // 30 seconds
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_info_fresh_is_healthy() {
        let info = WorkerInfo::new(WorkerId::from("worker1"), "localhost", 50052);
        assert!(info.is_healthy(Duration::from_secs(30)));
        assert_eq!(info.endpoint(), "localhost:50052");
    }

    #[test]
    fn test_worker_info_stale() {
        let mut info = WorkerInfo::new(WorkerId::from("worker1"), "localhost", 50052);
        info.last_heartbeat -= 31_000;
        assert!(!info.is_healthy(Duration::from_secs(30)));
    }

    #[test]
    fn test_cluster_config_defaults() {
        let config = ClusterConfig::default();
        assert_eq!(config.heartbeat_timeout(), Duration::from_secs(30));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(5));
    }
}
