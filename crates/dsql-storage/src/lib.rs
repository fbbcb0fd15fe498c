pub mod csv;
pub mod demo;
pub mod memory;

pub use csv::CsvTableLoader;
pub use memory::MemoryRowStore;

use dsql_core::Result;
use std::fmt::Debug;

/// Row storage visible to one worker
pub trait RowStore: Debug + Send + Sync {
    /// All rows of `table` in insertion order, `TableNotFound` if absent
    fn scan(&self, table: &str) -> Result<Vec<Vec<String>>>;

    fn table_names(&self) -> Vec<String>;

    fn row_count(&self, table: &str) -> Option<usize>;
}
