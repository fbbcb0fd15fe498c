use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Planning error: {0}")]
    PlanningError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

impl QueryError {
    /// True for errors that belong to a single task rather than the whole query
    pub fn is_task_scoped(&self) -> bool {
        matches!(
            self,
            QueryError::ExecutionError(_)
                | QueryError::ColumnNotFound(_)
                | QueryError::TableNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
