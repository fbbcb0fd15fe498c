//! Worker-side plan interpreter
//!
//! Evaluates a [`PlanNode`] tree against the worker's row store. Traversal
//! uses an explicit stack so deep trees cannot overflow the call stack.

use crate::partition::{partition_rows, PartitionMode};
use dsql_core::{
    Condition, NodeType, Operator, PlanNode, QueryError, Result, Row, SchemaRegistry, WorkerId,
};
use dsql_storage::RowStore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Configuration for the execution engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scan partitioning
    pub partition_mode: PartitionMode,
}

/// Output of one plan node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    /// Column names, aligned with row values
    pub columns: Vec<String>,
    /// Rows
    pub rows: Vec<Row>,
    /// Table that owns the unqualified columns, if any
    pub table: Option<String>,
}

impl Batch {
    /// Create a batch
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            table: None,
        }
    }

    /// Create a batch whose bare columns belong to `table`
    pub fn for_table(columns: Vec<String>, rows: Vec<Row>, table: impl Into<String>) -> Self {
        Self {
            columns,
            rows,
            table: Some(table.into()),
        }
    }

    /// Position of a bare or qualified column name
    pub fn resolve(&self, name: &str) -> Option<usize> {
        resolve_column(&self.columns, self.table.as_deref(), name)
    }

    /// Number of rows
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }
}

enum Step<'a> {
    Enter(&'a PlanNode),
    Exit(&'a PlanNode),
}

/// Executes plan trees for one worker
pub struct ExecutionEngine {
    /// Worker this engine runs on
    worker_id: WorkerId,
    /// Local rows
    store: Arc<dyn RowStore>,
    /// Column layouts
    schemas: Arc<SchemaRegistry>,
    /// Configuration
    config: EngineConfig,
}

impl ExecutionEngine {
    /// Create an engine
    pub fn new(
        worker_id: WorkerId,
        store: Arc<dyn RowStore>,
        schemas: Arc<SchemaRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            worker_id,
            store,
            schemas,
            config,
        }
    }

    /// Worker this engine runs on
    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    /// Evaluate a plan tree, children before parents
    pub fn execute_plan_node(&self, root: &PlanNode) -> Result<Batch> {
        root.check_depth()?;

        let mut steps = vec![Step::Enter(root)];
        let mut outputs: Vec<Batch> = Vec::new();

        while let Some(step) = steps.pop() {
            match step {
                Step::Enter(node) => {
                    steps.push(Step::Exit(node));
                    steps.extend(node.children.iter().rev().map(Step::Enter));
                }
                Step::Exit(node) => {
                    let inputs = outputs.split_off(outputs.len() - node.children.len());
                    let output = self.execute_node(node, inputs)?;
                    debug!(
                        "{} node {} produced {} rows on {}",
                        node.node_type,
                        node.id,
                        output.num_rows(),
                        self.worker_id
                    );
                    outputs.push(output);
                }
            }
        }

        outputs
            .pop()
            .ok_or_else(|| QueryError::ExecutionError("Plan produced no output".to_string()))
    }

    fn execute_node(&self, node: &PlanNode, mut inputs: Vec<Batch>) -> Result<Batch> {
        match node.node_type {
            NodeType::Scan => {
                if !inputs.is_empty() {
                    return Err(malformed(node, "SCAN must not have children"));
                }
                self.scan(node)
            }
            NodeType::Filter => {
                let input = single_input(node, &mut inputs)?;
                self.filter(node, input)
            }
            NodeType::Project => {
                let input = single_input(node, &mut inputs)?;
                self.project(node, input)
            }
            NodeType::Join => {
                if inputs.len() != 2 {
                    return Err(malformed(node, "JOIN requires exactly two children"));
                }
                let right = inputs.pop().unwrap_or_default();
                let left = inputs.pop().unwrap_or_default();
                self.join(node, left, right)
            }
            NodeType::Aggregate => {
                let input = single_input(node, &mut inputs)?;
                Ok(self.aggregate(input))
            }
        }
    }

    fn scan(&self, node: &PlanNode) -> Result<Batch> {
        let table = node
            .table_name
            .as_deref()
            .ok_or_else(|| malformed(node, "SCAN without table"))?;

        let schema = self.schemas.get(table)?;
        let rows = partition_rows(
            self.store.scan(table)?,
            self.config.partition_mode,
            &self.worker_id,
        );

        let projected = !node.columns.is_empty() && !node.columns.iter().any(|c| c == "*");
        let (columns, indices) = if projected {
            let indices = node
                .columns
                .iter()
                .map(|c| schema.index_of(c))
                .collect::<Result<Vec<_>>>()?;
            (node.columns.clone(), Some(indices))
        } else {
            (schema.columns().to_vec(), None)
        };

        let rows = rows
            .into_iter()
            .map(|values| {
                let values = match &indices {
                    Some(indices) => pick(&values, indices),
                    None => values,
                };
                let mut row = Row::from_table(values, table);
                row.set_worker_id(self.worker_id.as_str());
                row
            })
            .collect();

        Ok(Batch::for_table(columns, rows, table))
    }

    fn filter(&self, node: &PlanNode, input: Batch) -> Result<Batch> {
        if node.conditions.is_empty() {
            return Err(malformed(node, "FILTER without conditions"));
        }

        let predicates = node
            .conditions
            .iter()
            .map(|c| Predicate::compile(c, &input))
            .collect::<Result<Vec<_>>>()?;

        let rows = input
            .rows
            .into_iter()
            .filter(|row| predicates.iter().all(|p| p.matches(row)))
            .collect();

        Ok(Batch {
            rows,
            ..input
        })
    }

    fn project(&self, node: &PlanNode, input: Batch) -> Result<Batch> {
        if node.columns.is_empty() {
            return Err(malformed(node, "PROJECT without columns"));
        }
        if node.columns.iter().any(|c| c == "*") {
            return Ok(input);
        }

        let indices = node
            .columns
            .iter()
            .map(|c| {
                input.resolve(c).ok_or_else(|| QueryError::ColumnNotFound(c.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let rows = input
            .rows
            .into_iter()
            .map(|row| Row {
                values: pick(&row.values, &indices),
                metadata: row.metadata,
            })
            .collect();

        Ok(Batch {
            columns: node.columns.clone(),
            rows,
            table: input.table,
        })
    }

    fn join(&self, node: &PlanNode, left: Batch, right: Batch) -> Result<Batch> {
        let (left_table, right_table) = match &node.join {
            Some(join) => (join.left_table.clone(), join.right_table.clone()),
            None => (
                child_table(node, 0).unwrap_or_else(|| "left".to_string()),
                child_table(node, 1).unwrap_or_else(|| "right".to_string()),
            ),
        };

        // Without join keys, match the left row's first value against the right row's second
        let (left_key, right_key) = match &node.join {
            Some(join) => (
                left.resolve(&join.left_column)
                    .ok_or_else(|| QueryError::ColumnNotFound(join.left_column.clone()))?,
                right.resolve(&join.right_column)
                    .ok_or_else(|| QueryError::ColumnNotFound(join.right_column.clone()))?,
            ),
            None => (0, 1),
        };

        let source = format!("{}_{}", left_table, right_table);
        let mut rows = Vec::new();
        for l in &left.rows {
            let Some(lv) = l.value(left_key) else { continue };
            for r in &right.rows {
                if r.value(right_key) == Some(lv) {
                    let mut values = l.values.clone();
                    values.extend(r.values.iter().cloned());
                    let mut row = Row::from_table(values, source.as_str());
                    row.set_worker_id(self.worker_id.as_str());
                    rows.push(row);
                }
            }
        }

        let mut columns = qualify(&left.columns, &left_table);
        columns.extend(qualify(&right.columns, &right_table));
        Ok(Batch::new(columns, rows))
    }

    fn aggregate(&self, input: Batch) -> Batch {
        let mut row = Row::new(vec![input.num_rows().to_string()]);
        row.set_worker_id(self.worker_id.as_str());
        Batch::new(vec!["count".to_string()], vec![row])
    }
}

/// A condition bound to a column position
struct Predicate<'a> {
    condition: &'a Condition,
    index: Option<usize>,
    pattern: Option<Regex>,
}

impl<'a> Predicate<'a> {
    fn compile(condition: &'a Condition, input: &Batch) -> Result<Self> {
        let pattern = match condition.operator {
            Operator::Like => Some(like_to_regex(&condition.value)?),
            _ => None,
        };
        Ok(Self {
            condition,
            index: input.resolve(&condition.column),
            pattern,
        })
    }

    /// Unknown columns never match
    fn matches(&self, row: &Row) -> bool {
        let Some(value) = self.index.and_then(|i| row.value(i)) else {
            return false;
        };
        let expected = self.condition.value.as_str();

        match self.condition.operator {
            Operator::Equals => value == expected,
            Operator::NotEquals => value != expected,
            Operator::GreaterThan => compare_values(value, expected) == Ordering::Greater,
            Operator::LessThan => compare_values(value, expected) == Ordering::Less,
            Operator::GreaterThanEquals => compare_values(value, expected) != Ordering::Less,
            Operator::LessThanEquals => compare_values(value, expected) != Ordering::Greater,
            Operator::Like => self.pattern.as_ref().is_some_and(|p| p.is_match(value)),
            Operator::In => self.condition.in_list().iter().any(|v| v == value),
        }
    }
}

/// Numeric when both sides parse as numbers, lexicographic otherwise
pub fn compare_values(left: &str, right: &str) -> Ordering {
    match (left.parse::<f64>(), right.parse::<f64>()) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
        _ => left.cmp(right),
    }
}

/// SQL `%`/`_` wildcards to an anchored regex
pub fn like_to_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| QueryError::ExecutionError(format!("Invalid LIKE pattern: {}", e)))
}

/// Position of `name` among `columns`. A bare name matches a qualified
/// column by its column part. A qualified name matches a bare column only
/// when its table is `table`, the owner of the bare columns.
pub fn resolve_column(columns: &[String], table: Option<&str>, name: &str) -> Option<usize> {
    if let Some(i) = columns.iter().position(|c| c.eq_ignore_ascii_case(name)) {
        return Some(i);
    }

    let bare = |s: &str| -> Option<String> { s.split_once('.').map(|(_, c)| c.to_string()) };
    match name.split_once('.') {
        Some((qualifier, column)) => {
            if !table.is_some_and(|t| t.eq_ignore_ascii_case(qualifier)) {
                return None;
            }
            columns
                .iter()
                .position(|c| !c.contains('.') && c.eq_ignore_ascii_case(column))
        }
        None => columns
            .iter()
            .position(|c| bare(c).is_some_and(|b| b.eq_ignore_ascii_case(name))),
    }
}

fn qualify(columns: &[String], table: &str) -> Vec<String> {
    columns
        .iter()
        .map(|c| {
            if c.contains('.') {
                c.clone()
            } else {
                format!("{}.{}", table, c)
            }
        })
        .collect()
}

fn pick(values: &[String], indices: &[usize]) -> Vec<String> {
    indices
        .iter()
        .map(|&i| values.get(i).cloned().unwrap_or_default())
        .collect()
}

fn child_table(node: &PlanNode, index: usize) -> Option<String> {
    node.children.get(index).and_then(|c| c.table_name.clone())
}

fn single_input(node: &PlanNode, inputs: &mut Vec<Batch>) -> Result<Batch> {
    if inputs.len() != 1 {
        return Err(malformed(node, "expected exactly one child"));
    }
    inputs
        .pop()
        .ok_or_else(|| malformed(node, "expected exactly one child"))
}

fn malformed(node: &PlanNode, message: &str) -> QueryError {
    QueryError::ExecutionError(format!(
        "Malformed {} node {}: {}",
        node.node_type, node.id, message
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsql_core::{Join, MAX_PLAN_DEPTH};
    use dsql_storage::MemoryRowStore;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn engine_with(mode: PartitionMode, worker: &str) -> ExecutionEngine {
        let store = MemoryRowStore::new();
        let schemas = SchemaRegistry::new();

        schemas.register("users", strings(&["user_id", "name", "age"]));
        store.insert_table(
            "users",
            vec![
                strings(&["1", "Alice", "25"]),
                strings(&["2", "Bob", "30"]),
                strings(&["3", "Carol", "35"]),
            ],
        );

        schemas.register("orders", strings(&["order_id", "user_id", "amount"]));
        store.insert_table(
            "orders",
            vec![
                strings(&["10", "1", "99.5"]),
                strings(&["11", "3", "12.0"]),
                strings(&["12", "3", "250"]),
                strings(&["13", "9", "5"]),
            ],
        );

        ExecutionEngine::new(
            WorkerId::from(worker),
            Arc::new(store),
            Arc::new(schemas),
            EngineConfig {
                partition_mode: mode,
            },
        )
    }

    fn engine() -> ExecutionEngine {
        engine_with(PartitionMode::Full, "worker1")
    }

    fn filter(conditions: Vec<Condition>) -> PlanNode {
        PlanNode::filter("f", conditions, PlanNode::scan("users", 3))
    }

    fn column(batch: &Batch, name: &str) -> Vec<String> {
        let i = batch.resolve(name).unwrap();
        batch.rows.iter().map(|r| r.values[i].clone()).collect()
    }

    #[test]
    fn test_scan_sets_metadata() {
        let batch = engine().execute_plan_node(&PlanNode::scan("users", 3)).unwrap();

        assert_eq!(batch.columns, vec!["user_id", "name", "age"]);
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.rows[0].source_table(), Some("users"));
        assert_eq!(batch.rows[0].worker_id(), Some("worker1"));
    }

    #[test]
    fn test_scan_unknown_table() {
        let err = engine()
            .execute_plan_node(&PlanNode::scan("ghost", 0))
            .unwrap_err();
        assert!(matches!(err, QueryError::TableNotFound(_)));
    }

    #[test]
    fn test_scan_inline_projection() {
        let mut scan = PlanNode::scan("users", 3);
        scan.columns = strings(&["name"]);

        let batch = engine().execute_plan_node(&scan).unwrap();
        assert_eq!(batch.columns, vec!["name"]);
        assert_eq!(batch.rows[2].values, vec!["Carol"]);
    }

    #[test]
    fn test_filter_greater_than() {
        let plan = filter(vec![Condition::new("age", Operator::GreaterThan, "30")]);
        let batch = engine().execute_plan_node(&plan).unwrap();
        assert_eq!(column(&batch, "age"), vec!["35"]);
    }

    #[test]
    fn test_filter_conditions_are_anded() {
        let plan = filter(vec![
            Condition::new("age", Operator::GreaterThanEquals, "25"),
            Condition::new("name", Operator::NotEquals, "Bob"),
        ]);
        let batch = engine().execute_plan_node(&plan).unwrap();
        assert_eq!(column(&batch, "name"), vec!["Alice", "Carol"]);
    }

    #[test]
    fn test_filter_like_and_in() {
        let like = filter(vec![Condition::new("name", Operator::Like, "%o_")]);
        assert_eq!(
            column(&engine().execute_plan_node(&like).unwrap(), "name"),
            vec!["Bob", "Carol"]
        );

        let within = filter(vec![Condition::new("user_id", Operator::In, "1,3")]);
        assert_eq!(
            column(&engine().execute_plan_node(&within).unwrap(), "name"),
            vec!["Alice", "Carol"]
        );
    }

    #[test]
    fn test_filter_in_literal_with_comma() {
        let store = MemoryRowStore::new();
        let schemas = SchemaRegistry::new();
        schemas.register("users", strings(&["id", "city"]));
        store.insert_table(
            "users",
            vec![strings(&["1", "New York, NY"]), strings(&["2", "NY"])],
        );
        let engine = ExecutionEngine::new(
            WorkerId::from("worker1"),
            Arc::new(store),
            Arc::new(schemas),
            EngineConfig::default(),
        );

        let plan = PlanNode::filter(
            "f",
            vec![Condition::in_values("city", vec!["New York, NY".to_string()])],
            PlanNode::scan("users", 2),
        );
        let batch = engine.execute_plan_node(&plan).unwrap();
        assert_eq!(column(&batch, "id"), vec!["1"]);
    }

    #[test]
    fn test_filter_qualifier_must_match_table() {
        let own = filter(vec![Condition::new("users.age", Operator::GreaterThan, "30")]);
        assert_eq!(
            column(&engine().execute_plan_node(&own).unwrap(), "name"),
            vec!["Carol"]
        );

        let other = filter(vec![Condition::new("orders.age", Operator::GreaterThan, "30")]);
        assert_eq!(engine().execute_plan_node(&other).unwrap().num_rows(), 0);
    }

    #[test]
    fn test_resolve_column_qualifiers() {
        let columns = strings(&["user_id", "name"]);
        assert_eq!(resolve_column(&columns, Some("users"), "USERS.name"), Some(1));
        assert_eq!(resolve_column(&columns, Some("users"), "orders.name"), None);
        assert_eq!(resolve_column(&columns, None, "users.name"), None);

        let joined = strings(&["users.user_id", "orders.user_id"]);
        assert_eq!(resolve_column(&joined, None, "orders.user_id"), Some(1));
        assert_eq!(resolve_column(&joined, None, "user_id"), Some(0));
    }

    #[test]
    fn test_filter_unknown_column_matches_nothing() {
        let plan = filter(vec![Condition::new("salary", Operator::Equals, "1")]);
        assert_eq!(engine().execute_plan_node(&plan).unwrap().num_rows(), 0);
    }

    #[test]
    fn test_filter_without_conditions_fails() {
        let plan = filter(vec![]);
        assert!(matches!(
            engine().execute_plan_node(&plan),
            Err(QueryError::ExecutionError(_))
        ));
    }

    #[test]
    fn test_project() {
        let plan = PlanNode::project("p", strings(&["users.name", "age"]), PlanNode::scan("users", 3));
        let batch = engine().execute_plan_node(&plan).unwrap();

        assert_eq!(batch.columns, vec!["users.name", "age"]);
        assert_eq!(batch.rows[1].values, vec!["Bob", "30"]);
        assert_eq!(batch.rows[1].source_table(), Some("users"));
    }

    #[test]
    fn test_project_unknown_column() {
        let plan = PlanNode::project("p", strings(&["salary"]), PlanNode::scan("users", 3));
        assert!(matches!(
            engine().execute_plan_node(&plan),
            Err(QueryError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_join_by_keys() {
        let join = Join::inner("users", "orders", "users.user_id", "orders.user_id");
        let plan = PlanNode::join(
            "j",
            join,
            PlanNode::scan("users", 3),
            PlanNode::scan("orders", 4),
        );
        let batch = engine().execute_plan_node(&plan).unwrap();

        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.columns.len(), 6);
        assert_eq!(batch.columns[0], "users.user_id");
        assert_eq!(batch.columns[5], "orders.amount");
        assert_eq!(batch.rows[0].source_table(), Some("users_orders"));
        assert_eq!(column(&batch, "name"), vec!["Alice", "Carol", "Carol"]);
    }

    #[test]
    fn test_join_positional_fallback() {
        let mut plan = PlanNode::new("j", NodeType::Join);
        plan.add_child(PlanNode::scan("users", 3));
        plan.add_child(PlanNode::scan("orders", 4));

        // users.user_id (position 0) against orders.user_id (position 1)
        let batch = engine().execute_plan_node(&plan).unwrap();
        assert_eq!(batch.num_rows(), 3);
    }

    #[test]
    fn test_join_requires_two_children() {
        let mut plan = PlanNode::new("j", NodeType::Join);
        plan.add_child(PlanNode::scan("users", 3));
        assert!(matches!(
            engine().execute_plan_node(&plan),
            Err(QueryError::ExecutionError(_))
        ));
    }

    #[test]
    fn test_filter_then_project_over_join() {
        let join = Join::inner("users", "orders", "user_id", "user_id");
        let tree = PlanNode::join("j", join, PlanNode::scan("users", 3), PlanNode::scan("orders", 4));
        let tree = PlanNode::filter(
            "f",
            vec![Condition::new("orders.amount", Operator::GreaterThan, "50")],
            tree,
        );
        let tree = PlanNode::project("p", strings(&["name", "amount"]), tree);

        let batch = engine().execute_plan_node(&tree).unwrap();
        assert_eq!(
            batch.rows.iter().map(|r| r.values.clone()).collect::<Vec<_>>(),
            vec![strings(&["Alice", "99.5"]), strings(&["Carol", "250"])]
        );
    }

    #[test]
    fn test_aggregate_counts_child_rows() {
        let plan = PlanNode::aggregate(
            "a",
            filter(vec![Condition::new("age", Operator::LessThan, "35")]),
        );
        let batch = engine().execute_plan_node(&plan).unwrap();
        assert_eq!(batch.columns, vec!["count"]);
        assert_eq!(batch.rows[0].values, vec!["2"]);
    }

    #[test]
    fn test_simulated_partitioning() {
        let mode = PartitionMode::Simulated { partitions: 2 };
        let first = engine_with(mode, "worker1")
            .execute_plan_node(&PlanNode::scan("orders", 4))
            .unwrap();
        let second = engine_with(mode, "worker2")
            .execute_plan_node(&PlanNode::scan("orders", 4))
            .unwrap();

        assert_eq!(column(&first, "order_id"), vec!["10", "11"]);
        assert_eq!(column(&second, "order_id"), vec!["12", "13"]);
    }

    #[test]
    fn test_depth_guard() {
        let mut node = PlanNode::scan("users", 3);
        for i in 0..MAX_PLAN_DEPTH {
            node = PlanNode::project(format!("p{}", i), strings(&["*"]), node);
        }
        assert!(engine().execute_plan_node(&node).is_err());
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values("10", "9"), Ordering::Greater);
        assert_eq!(compare_values("9.5", "10"), Ordering::Less);
        assert_eq!(compare_values("apple", "banana"), Ordering::Less);
        assert_eq!(compare_values("2024-02-01", "2024-01-15"), Ordering::Greater);
    }

    #[test]
    fn test_like_escapes_regex_characters() {
        let re = like_to_regex("a.b%").unwrap();
        assert!(re.is_match("a.bcd"));
        assert!(!re.is_match("axbcd"));
    }
}
