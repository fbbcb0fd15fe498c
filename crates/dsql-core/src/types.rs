use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

static INTEGER_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+$").unwrap());
static DOUBLE_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+\.\d+$").unwrap());
static DATE_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

fn short_uuid() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

/// Identifier of a worker node, e.g. `worker1`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for WorkerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryId(pub String);

impl QueryId {
    pub fn generate() -> Self {
        Self(format!("query_{}", short_uuid()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueryId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    /// Task ids are stable per (query, worker) pair
    pub fn for_worker(query_id: &QueryId, worker_id: &WorkerId) -> Self {
        Self(format!("task_{}_{}", query_id, worker_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Type of a literal in a WHERE condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    String,
    Integer,
    Double,
    Boolean,
    Date,
}

impl DataType {
    /// Infer the type from the lexical shape of a literal
    pub fn infer(literal: &str) -> Self {
        if INTEGER_LITERAL.is_match(literal) {
            DataType::Integer
        } else if DOUBLE_LITERAL.is_match(literal) {
            DataType::Double
        } else if literal.eq_ignore_ascii_case("true") || literal.eq_ignore_ascii_case("false") {
            DataType::Boolean
        } else if DATE_LITERAL.is_match(literal) {
            DataType::Date
        } else {
            DataType::String
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::String => "STRING",
            DataType::Integer => "INTEGER",
            DataType::Double => "DOUBLE",
            DataType::Boolean => "BOOLEAN",
            DataType::Date => "DATE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterThanEquals,
    LessThanEquals,
    Like,
    In,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::GreaterThan => ">",
            Operator::LessThan => "<",
            Operator::GreaterThanEquals => ">=",
            Operator::LessThanEquals => "<=",
            Operator::Like => "LIKE",
            Operator::In => "IN",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    pub operator: Operator,
    /// Comparison literal; for `IN` the items joined with `", "` for display only
    pub value: String,
    /// Items of an `IN` list, kept whole so literals may contain commas
    #[serde(default)]
    pub values: Vec<String>,
    pub data_type: DataType,
}

impl Condition {
    /// For `IN`, `value` is split on commas; use [`Condition::in_values`] for
    /// literals that contain them.
    pub fn new(column: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        let value = value.into();
        if operator == Operator::In {
            return Self::in_values(column, value.split(',').map(|v| v.trim().to_string()));
        }
        Self {
            column: column.into(),
            operator,
            data_type: DataType::infer(&value),
            value,
            values: Vec::new(),
        }
    }

    /// `column IN (values...)`; the type is inferred from the first item
    pub fn in_values(column: impl Into<String>, values: impl IntoIterator<Item = String>) -> Self {
        let values: Vec<String> = values.into_iter().collect();
        let data_type = DataType::infer(values.first().map(String::as_str).unwrap_or(""));
        Self {
            column: column.into(),
            operator: Operator::In,
            value: values.join(", "),
            values,
            data_type,
        }
    }

    /// Items of an `IN` list
    pub fn in_list(&self) -> &[String] {
        &self.values
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::In => write!(f, "{} IN ({})", self.column, self.value),
            _ => write!(f, "{} {} {}", self.column, self.operator, self.value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    pub left_table: String,
    pub right_table: String,
    pub left_column: String,
    pub right_column: String,
    pub join_type: JoinType,
}

impl Join {
    pub fn inner(
        left_table: impl Into<String>,
        right_table: impl Into<String>,
        left_column: impl Into<String>,
        right_column: impl Into<String>,
    ) -> Self {
        Self {
            left_table: left_table.into(),
            right_table: right_table.into(),
            left_column: left_column.into(),
            right_column: right_column.into(),
            join_type: JoinType::Inner,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
}

/// A parsed SELECT statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: QueryId,
    pub sql: String,
    pub query_type: QueryType,
    pub select_columns: Vec<String>,
    pub from_tables: Vec<String>,
    pub where_conditions: Vec<Condition>,
    pub joins: Vec<Join>,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            id: QueryId::generate(),
            sql: sql.into(),
            query_type: QueryType::Select,
            select_columns: Vec::new(),
            from_tables: Vec::new(),
            where_conditions: Vec::new(),
            joins: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: QueryId) -> Self {
        self.id = id;
        self
    }

    pub fn has_conditions(&self) -> bool {
        !self.where_conditions.is_empty()
    }

    pub fn has_joins(&self) -> bool {
        !self.joins.is_empty()
    }

    pub fn selects_all(&self) -> bool {
        self.select_columns.is_empty() || self.select_columns.iter().any(|c| c == "*")
    }

    pub fn is_count(&self) -> bool {
        self.select_columns.len() == 1 && self.select_columns[0].eq_ignore_ascii_case("COUNT(*)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_integer() {
        assert_eq!(DataType::infer("30"), DataType::Integer);
        assert_eq!(DataType::infer("-7"), DataType::Integer);
    }

    #[test]
    fn test_infer_double() {
        assert_eq!(DataType::infer("999.99"), DataType::Double);
        assert_eq!(DataType::infer("-0.5"), DataType::Double);
        assert_eq!(DataType::infer("1."), DataType::String);
    }

    #[test]
    fn test_infer_boolean() {
        assert_eq!(DataType::infer("true"), DataType::Boolean);
        assert_eq!(DataType::infer("FALSE"), DataType::Boolean);
        assert_eq!(DataType::infer("True"), DataType::Boolean);
    }

    #[test]
    fn test_infer_date_and_string() {
        assert_eq!(DataType::infer("2024-01-15"), DataType::Date);
        assert_eq!(DataType::infer("2024-1-15"), DataType::String);
        assert_eq!(DataType::infer("Alice"), DataType::String);
        assert_eq!(DataType::infer(""), DataType::String);
    }

    #[test]
    fn test_in_condition_type_from_first_item() {
        let cond = Condition::new("age", Operator::In, "25,30, 35");
        assert_eq!(cond.data_type, DataType::Integer);
        assert_eq!(cond.in_list(), ["25", "30", "35"]);
    }

    #[test]
    fn test_in_values_keep_commas() {
        let cond = Condition::in_values("city", vec!["New York, NY".to_string(), "Austin".to_string()]);
        assert_eq!(cond.in_list(), ["New York, NY", "Austin"]);
        assert_eq!(cond.data_type, DataType::String);
    }

    #[test]
    fn test_task_id_for_worker() {
        let task = TaskId::for_worker(&QueryId::from("q1"), &WorkerId::from("worker2"));
        assert_eq!(task.as_str(), "task_q1_worker2");
    }

    #[test]
    fn test_query_selects_all() {
        let mut query = Query::new("SELECT * FROM users");
        query.select_columns = vec!["*".to_string()];
        assert!(query.selects_all());
        assert!(!query.is_count());

        query.select_columns = vec!["count(*)".to_string()];
        assert!(query.is_count());
    }
}
