//! Error types for distributed execution

use thiserror::Error;

/// Errors that can occur during distributed execution
#[derive(Error, Debug)]
pub enum DistributedError {
    /// Parse, planning or execution error from the query layer
    #[error("Query error: {0}")]
    Query(#[from] dsql_core::QueryError),

    /// Worker not found
    #[error("Worker not found: {0}")]
    WorkerNotFound(String),

    /// Transport-level failure talking to a worker
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Query did not finish within the global timeout
    #[error("Query timed out after {0}ms")]
    QueryTimeout(u64),

    /// No workers own shards for the referenced tables
    #[error("No workers available to execute query")]
    NoWorkersAvailable,

    /// Every dispatched task failed
    #[error("All {0} tasks failed")]
    AllTasksFailed(usize),
}

/// Result type for distributed operations
pub type Result<T> = std::result::Result<T, DistributedError>;
