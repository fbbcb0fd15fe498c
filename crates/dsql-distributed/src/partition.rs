//! Simulated horizontal partitioning
//!
//! Every worker sees the full row store, so a scan can optionally keep only
//! one ordinal slice of the table to mimic data that is split across nodes.

use dsql_core::WorkerId;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// How a worker's scans select rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PartitionMode {
    /// Scan the whole table
    #[default]
    Full,
    /// Scan only this worker's slice out of `partitions` ordinal ranges
    Simulated {
        /// Number of slices the table is cut into
        partitions: usize,
    },
}

/// Slice index of a worker: `workerN` maps to `(N - 1) % partitions`,
/// other ids fall back to a stable hash of the id
pub fn worker_index(worker_id: &WorkerId, partitions: usize) -> usize {
    let partitions = partitions.max(1);
    let id = worker_id.as_str();
    let digits: String = id
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    match digits.parse::<u64>() {
        Ok(n) => (n.saturating_sub(1) % partitions as u64) as usize,
        Err(_) => (stable_hash(id) % partitions as u64) as usize,
    }
}

/// Ordinal range of slice `index`; the last slice takes the remainder
pub fn slice_range(total: usize, partitions: usize, index: usize) -> Range<usize> {
    let partitions = partitions.max(1);
    let index = index.min(partitions - 1);
    let chunk = total / partitions;
    let start = index * chunk;
    let end = if index == partitions - 1 {
        total
    } else {
        start + chunk
    };
    start..end
}

/// Rows of `rows` that fall into this worker's slice
pub fn partition_rows<T>(rows: Vec<T>, mode: PartitionMode, worker_id: &WorkerId) -> Vec<T> {
    match mode {
        PartitionMode::Full => rows,
        PartitionMode::Simulated { partitions } => {
            let range = slice_range(rows.len(), partitions, worker_index(worker_id, partitions));
            rows.into_iter()
                .skip(range.start)
                .take(range.end - range.start)
                .collect()
        }
    }
}

fn stable_hash(value: &str) -> u64 {
    value
        .bytes()
        .fold(0u64, |h, b| h.wrapping_mul(31).wrapping_add(b as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_index_from_trailing_number() {
        assert_eq!(worker_index(&WorkerId::from("worker1"), 3), 0);
        assert_eq!(worker_index(&WorkerId::from("worker3"), 3), 2);
        assert_eq!(worker_index(&WorkerId::from("worker4"), 3), 0);
        assert_eq!(worker_index(&WorkerId::from("node-12"), 4), 3);
    }

    #[test]
    fn test_worker_index_hash_fallback_is_stable() {
        let id = WorkerId::from("alpha");
        let first = worker_index(&id, 5);
        assert!(first < 5);
        assert_eq!(first, worker_index(&id, 5));
    }

    #[test]
    fn test_slices_cover_all_rows() {
        let total = 10;
        let ranges: Vec<_> = (0..3).map(|i| slice_range(total, 3, i)).collect();

        assert_eq!(ranges[0], 0..3);
        assert_eq!(ranges[1], 3..6);
        assert_eq!(ranges[2], 6..10);
    }

    #[test]
    fn test_partition_rows() {
        let rows: Vec<u32> = (0..7).collect();
        let full = partition_rows(rows.clone(), PartitionMode::Full, &WorkerId::from("worker2"));
        assert_eq!(full.len(), 7);

        let mode = PartitionMode::Simulated { partitions: 2 };
        let second = partition_rows(rows, mode, &WorkerId::from("worker2"));
        assert_eq!(second, vec![3, 4, 5, 6]);
    }
}
