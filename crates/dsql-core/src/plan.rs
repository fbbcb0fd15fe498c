use crate::error::{QueryError, Result};
use crate::types::{Condition, Join, QueryId, WorkerId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Deepest plan tree accepted by planning and execution
pub const MAX_PLAN_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Scan,
    Filter,
    Join,
    Project,
    Aggregate,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeType::Scan => "SCAN",
            NodeType::Filter => "FILTER",
            NodeType::Join => "JOIN",
            NodeType::Project => "PROJECT",
            NodeType::Aggregate => "AGGREGATE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    pub id: String,
    pub node_type: NodeType,
    pub table_name: Option<String>,
    pub columns: Vec<String>,
    pub conditions: Vec<Condition>,
    pub join: Option<Join>,
    pub children: Vec<PlanNode>,
    pub estimated_rows: u64,
    pub worker_id: Option<WorkerId>,
}

impl PlanNode {
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            node_type,
            table_name: None,
            columns: Vec::new(),
            conditions: Vec::new(),
            join: None,
            children: Vec::new(),
            estimated_rows: 0,
            worker_id: None,
        }
    }

    pub fn scan(table: impl Into<String>, estimated_rows: u64) -> Self {
        let table = table.into();
        let mut node = Self::new(format!("scan_{}", table), NodeType::Scan);
        node.table_name = Some(table);
        node.columns = vec!["*".to_string()];
        node.estimated_rows = estimated_rows;
        node
    }

    pub fn filter(id: impl Into<String>, conditions: Vec<Condition>, input: PlanNode) -> Self {
        let mut node = Self::new(id, NodeType::Filter);
        node.estimated_rows = input.estimated_rows;
        node.conditions = conditions;
        node.children.push(input);
        node
    }

    pub fn project(id: impl Into<String>, columns: Vec<String>, input: PlanNode) -> Self {
        let mut node = Self::new(id, NodeType::Project);
        node.estimated_rows = input.estimated_rows;
        node.columns = columns;
        node.children.push(input);
        node
    }

    pub fn join(id: impl Into<String>, join: Join, left: PlanNode, right: PlanNode) -> Self {
        let mut node = Self::new(id, NodeType::Join);
        node.table_name = Some(format!("{}_{}", join.left_table, join.right_table));
        node.estimated_rows = left.estimated_rows.min(right.estimated_rows);
        node.join = Some(join);
        node.children.push(left);
        node.children.push(right);
        node
    }

    pub fn aggregate(id: impl Into<String>, input: PlanNode) -> Self {
        let mut node = Self::new(id, NodeType::Aggregate);
        node.columns = vec!["count".to_string()];
        node.estimated_rows = 1;
        node.children.push(input);
        node
    }

    pub fn add_child(&mut self, child: PlanNode) {
        self.children.push(child);
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of levels in the tree, computed without recursion
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(self, 1usize)];
        while let Some((node, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            stack.extend(node.children.iter().map(|c| (c, depth + 1)));
        }
        max_depth
    }

    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }

    /// All leaf nodes, left to right
    pub fn leaves(&self) -> Vec<&PlanNode> {
        let mut leaves = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.is_leaf() {
                leaves.push(node);
            }
            stack.extend(node.children.iter().rev());
        }
        leaves
    }

    pub fn check_depth(&self) -> Result<()> {
        let depth = self.depth();
        if depth > MAX_PLAN_DEPTH {
            return Err(QueryError::ExecutionError(format!(
                "Plan depth {} exceeds limit of {}",
                depth, MAX_PLAN_DEPTH
            )));
        }
        Ok(())
    }

    /// Independent copy of the tree with every node assigned to `worker_id`
    pub fn stamped_for(&self, worker_id: &WorkerId) -> PlanNode {
        let mut copy = self.clone();
        let mut stack = vec![&mut copy];
        while let Some(node) = stack.pop() {
            node.id = format!("{}_{}", node.id, worker_id);
            node.worker_id = Some(worker_id.clone());
            stack.extend(node.children.iter_mut());
        }
        copy
    }

    /// Indented one-line-per-node rendering
    pub fn explain(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![(self, 0usize)];
        while let Some((node, indent)) = stack.pop() {
            out.push_str(&"  ".repeat(indent));
            out.push_str(&node.node_type.to_string());
            if let Some(table) = &node.table_name {
                out.push_str(&format!(" table={}", table));
            }
            if !node.columns.is_empty() && node.node_type != NodeType::Scan {
                out.push_str(&format!(" columns=[{}]", node.columns.join(", ")));
            }
            if !node.conditions.is_empty() {
                let conds: Vec<String> = node.conditions.iter().map(|c| c.to_string()).collect();
                out.push_str(&format!(" where=[{}]", conds.join(" AND ")));
            }
            out.push_str(&format!(" rows~{}\n", node.estimated_rows));
            stack.extend(node.children.iter().rev().map(|c| (c, indent + 1)));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub plan_id: String,
    pub query_id: QueryId,
    pub root: PlanNode,
    pub worker_ids: Vec<WorkerId>,
    /// Diagnostic only
    pub estimated_cost: f64,
    pub planning_time: Duration,
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QueryPlan{{id='{}', workers={}, cost={:.1}, planTime={}ms}}",
            self.plan_id,
            self.worker_ids.len(),
            self.estimated_cost,
            self.planning_time.as_millis()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Operator;

    fn sample_tree() -> PlanNode {
        let join = Join::inner("users", "orders", "user_id", "user_id");
        let root = PlanNode::join(
            "join_1",
            join,
            PlanNode::scan("users", 20),
            PlanNode::scan("orders", 30),
        );
        let root = PlanNode::filter(
            "filter_1",
            vec![Condition::new("age", Operator::GreaterThan, "30")],
            root,
        );
        PlanNode::project("project_1", vec!["name".into()], root)
    }

    #[test]
    fn test_depth_and_count() {
        let tree = sample_tree();
        assert_eq!(tree.depth(), 4);
        assert_eq!(tree.node_count(), 5);
        assert!(tree.check_depth().is_ok());
    }

    #[test]
    fn test_join_estimate_is_min() {
        let tree = sample_tree();
        assert_eq!(tree.estimated_rows, 20);
    }

    #[test]
    fn test_leaves_are_scans() {
        let tree = sample_tree();
        let leaves = tree.leaves();
        assert_eq!(leaves.len(), 2);
        assert!(leaves.iter().all(|l| l.node_type == NodeType::Scan));
        assert_eq!(leaves[0].table_name.as_deref(), Some("users"));
    }

    #[test]
    fn test_stamped_copies_are_independent() {
        let tree = sample_tree();
        let w1 = tree.stamped_for(&WorkerId::from("worker1"));
        let mut w2 = tree.stamped_for(&WorkerId::from("worker2"));

        w2.children.clear();

        assert_eq!(w1.node_count(), 5);
        assert_eq!(tree.node_count(), 5);
        assert!(tree.worker_id.is_none());
        assert_eq!(w1.leaves()[1].worker_id, Some(WorkerId::from("worker1")));
        assert_eq!(w1.id, "project_1_worker1");
    }

    #[test]
    fn test_depth_guard() {
        let mut node = PlanNode::scan("users", 1);
        for i in 0..MAX_PLAN_DEPTH {
            node = PlanNode::project(format!("p{}", i), vec!["id".into()], node);
        }
        assert!(node.check_depth().is_err());
    }

    #[test]
    fn test_explain_lists_every_node() {
        let text = sample_tree().explain();
        assert_eq!(text.lines().count(), 5);
        assert!(text.starts_with("PROJECT"));
        assert!(text.contains("    JOIN") || text.contains("  JOIN"));
    }
}
