use crate::types::QueryId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SOURCE_TABLE: &str = "source_table";
pub const WORKER_ID: &str = "worker_id";

/// A row of string values plus provenance metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<String>,
    pub metadata: BTreeMap<String, String>,
}

impl Row {
    pub fn new(values: Vec<String>) -> Self {
        Self {
            values,
            metadata: BTreeMap::new(),
        }
    }

    pub fn from_table(values: Vec<String>, table: impl Into<String>) -> Self {
        let mut row = Self::new(values);
        row.set_source_table(table);
        row
    }

    pub fn value(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn source_table(&self) -> Option<&str> {
        self.metadata.get(SOURCE_TABLE).map(String::as_str)
    }

    pub fn set_source_table(&mut self, table: impl Into<String>) {
        self.metadata.insert(SOURCE_TABLE.to_string(), table.into());
    }

    pub fn worker_id(&self) -> Option<&str> {
        self.metadata.get(WORKER_ID).map(String::as_str)
    }

    pub fn set_worker_id(&mut self, worker_id: impl Into<String>) {
        self.metadata.insert(WORKER_ID.to_string(), worker_id.into());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub query_id: QueryId,
    pub column_names: Vec<String>,
    pub rows: Vec<Row>,
    pub execution_time_ms: u64,
    pub status: QueryStatus,
}

impl ResultSet {
    pub fn new(query_id: QueryId) -> Self {
        Self {
            query_id,
            column_names: Vec::new(),
            rows: Vec::new(),
            execution_time_ms: 0,
            status: QueryStatus::Pending,
        }
    }

    pub fn failed(query_id: QueryId) -> Self {
        Self {
            status: QueryStatus::Failed,
            ..Self::new(query_id)
        }
    }

    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn add_rows(&mut self, rows: impl IntoIterator<Item = Row>) {
        self.rows.extend(rows);
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_metadata() {
        let mut row = Row::from_table(vec!["1".into(), "Alice".into()], "users");
        row.set_worker_id("worker1");

        assert_eq!(row.source_table(), Some("users"));
        assert_eq!(row.worker_id(), Some("worker1"));
        assert_eq!(row.value(1), Some("Alice"));
        assert_eq!(row.value(2), None);
    }

    #[test]
    fn test_result_set_add_rows() {
        let mut result = ResultSet::new(QueryId::from("q1"));
        result.add_rows(vec![Row::new(vec!["a".into()]), Row::new(vec!["b".into()])]);

        assert_eq!(result.total_rows(), 2);
        assert!(!result.is_success());
    }

    #[test]
    fn test_row_serde_keeps_metadata() {
        let mut row = Row::new(vec!["42".into()]);
        row.set_worker_id("worker3");

        let json = serde_json::to_string(&row).unwrap();
        let back: Row = serde_json::from_str(&json).unwrap();
        assert_eq!(back.worker_id(), Some("worker3"));
    }
}
