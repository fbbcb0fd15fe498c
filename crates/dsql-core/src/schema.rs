use crate::error::{QueryError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Ordered column names of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    columns: Vec<String>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of a bare (`age`) or qualified (`users.age`) column
    pub fn index_of(&self, name: &str) -> Result<usize> {
        let bare = match name.split_once('.') {
            Some((table, column)) if table.eq_ignore_ascii_case(&self.name) => column,
            Some(_) => return Err(QueryError::ColumnNotFound(name.to_string())),
            None => name,
        };
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(bare))
            .ok_or_else(|| QueryError::ColumnNotFound(name.to_string()))
    }

    /// Column names prefixed with the table name
    pub fn qualified_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| format!("{}.{}", self.name, c))
            .collect()
    }
}

/// Table name to column layout, shared by the planner side and every worker
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    tables: RwLock<HashMap<String, TableSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(tables: &BTreeMap<String, Vec<String>>) -> Self {
        let registry = Self::new();
        for (name, columns) in tables {
            registry.register(name.clone(), columns.clone());
        }
        registry
    }

    pub fn register(&self, table: impl Into<String>, columns: Vec<String>) {
        let table = table.into();
        let key = table.to_lowercase();
        self.tables.write().insert(key, TableSchema::new(table, columns));
    }

    pub fn get(&self, table: &str) -> Result<TableSchema> {
        self.tables
            .read()
            .get(&table.to_lowercase())
            .cloned()
            .ok_or_else(|| QueryError::TableNotFound(table.to_string()))
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.read().contains_key(&table.to_lowercase())
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .read()
            .values()
            .map(|s| s.name().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn to_map(&self) -> BTreeMap<String, Vec<String>> {
        self.tables
            .read()
            .values()
            .map(|s| (s.name().to_string(), s.columns().to_vec()))
            .collect()
    }
}
