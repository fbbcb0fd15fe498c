use crate::memory::MemoryRowStore;
use dsql_core::{QueryError, Result, SchemaRegistry};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Loads `<dir>/<table>.csv` files; the header row becomes the table's columns
#[derive(Debug, Clone)]
pub struct CsvTableLoader {
    dir: PathBuf,
}

impl CsvTableLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read one file into (columns, rows)
    pub fn read_file(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>)> {
        let file = File::open(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if columns.is_empty() {
            return Err(QueryError::ExecutionError(format!(
                "CSV file {} has no header",
                path.display()
            )));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok((columns, rows))
    }

    pub fn load_table(
        &self,
        table: &str,
        store: &MemoryRowStore,
        schemas: &SchemaRegistry,
    ) -> Result<usize> {
        let path = self.dir.join(format!("{}.csv", table));
        let (columns, rows) = Self::read_file(&path)?;
        let count = rows.len();

        schemas.register(table, columns);
        store.insert_table(table, rows);

        debug!("Loaded {} rows into {} from {}", count, table, path.display());
        Ok(count)
    }

    /// Load every `*.csv` file in the directory, returning the table names
    pub fn load_all(&self, store: &MemoryRowStore, schemas: &SchemaRegistry) -> Result<Vec<String>> {
        let mut tables = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            if let Some(table) = path.file_stem().and_then(|s| s.to_str()) {
                self.load_table(table, store, schemas)?;
                tables.push(table.to_string());
            }
        }

        tables.sort();
        info!("Loaded {} tables from {}", tables.len(), self.dir.display());
        Ok(tables)
    }
}
