//! In-memory row store
//!
//! Tables are keyed case-insensitively and hold rows as ordered string
//! values, matching the wire representation used between nodes.

use crate::RowStore;
use dsql_core::{QueryError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MemoryRowStore {
    tables: RwLock<HashMap<String, Vec<Vec<String>>>>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents of `table`
    pub fn insert_table(&self, table: &str, rows: Vec<Vec<String>>) {
        self.tables.write().insert(table.to_lowercase(), rows);
    }

    /// Append rows, creating the table when missing
    pub fn append_rows(&self, table: &str, rows: impl IntoIterator<Item = Vec<String>>) {
        self.tables
            .write()
            .entry(table.to_lowercase())
            .or_default()
            .extend(rows);
    }

    pub fn drop_table(&self, table: &str) -> bool {
        self.tables.write().remove(&table.to_lowercase()).is_some()
    }
}

impl RowStore for MemoryRowStore {
    fn scan(&self, table: &str) -> Result<Vec<Vec<String>>> {
        self.tables
            .read()
            .get(&table.to_lowercase())
            .cloned()
            .ok_or_else(|| QueryError::TableNotFound(table.to_string()))
    }

    fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn row_count(&self, table: &str) -> Option<usize> {
        self.tables.read().get(&table.to_lowercase()).map(Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_insert_and_scan() {
        let store = MemoryRowStore::new();
        store.insert_table("Users", vec![row(&["1", "Alice"]), row(&["2", "Bob"])]);

        let rows = store.scan("users").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][1], "Bob");
        assert_eq!(store.row_count("USERS"), Some(2));
    }

    #[test]
    fn test_unknown_table() {
        let store = MemoryRowStore::new();
        assert!(matches!(
            store.scan("missing"),
            Err(QueryError::TableNotFound(_))
        ));
        assert_eq!(store.row_count("missing"), None);
    }

    #[test]
    fn test_append_and_drop() {
        let store = MemoryRowStore::new();
        store.append_rows("orders", vec![row(&["1"])]);
        store.append_rows("orders", vec![row(&["2"]), row(&["3"])]);
        assert_eq!(store.row_count("orders"), Some(3));
        assert_eq!(store.table_names(), vec!["orders"]);

        assert!(store.drop_table("orders"));
        assert!(store.table_names().is_empty());
    }
}
