pub mod error;
pub mod plan;
pub mod row;
pub mod schema;
pub mod types;

pub use error::{QueryError, Result};
pub use plan::{NodeType, PlanNode, QueryPlan, MAX_PLAN_DEPTH};
pub use row::{QueryStatus, ResultSet, Row};
pub use schema::{SchemaRegistry, TableSchema};
pub use types::*;
