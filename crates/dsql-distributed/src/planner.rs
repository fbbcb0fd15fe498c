//! Shard-aware query planner

use crate::shard::ShardManager;
use dsql_core::{
    NodeType, PlanNode, Query, QueryError, QueryPlan, QueryType, Result, WorkerId, MAX_PLAN_DEPTH,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Weights of the diagnostic cost estimate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModel {
    /// Fixed cost of every query
    pub base_cost: f64,
    /// Cost per shard row read
    pub row_cost: f64,
    /// Cost per WHERE condition
    pub condition_cost: f64,
    /// Cost per join
    pub join_cost: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            base_cost: 10.0,
            row_cost: 0.1,
            condition_cost: 5.0,
            join_cost: 20.0,
        }
    }
}

/// Builds plan trees and picks the workers that hold the referenced tables
pub struct QueryPlanner {
    /// Shard metadata
    shard_manager: Arc<ShardManager>,
    /// Cost weights
    cost_model: CostModel,
}

impl QueryPlanner {
    /// Create a planner over the given shard metadata
    pub fn new(shard_manager: Arc<ShardManager>, cost_model: CostModel) -> Self {
        Self {
            shard_manager,
            cost_model,
        }
    }

    /// Create with the default cost model
    pub fn with_defaults(shard_manager: Arc<ShardManager>) -> Self {
        Self::new(shard_manager, CostModel::default())
    }

    /// Build the execution plan for a parsed query
    pub fn create_plan(&self, query: &Query) -> Result<QueryPlan> {
        let start = Instant::now();

        if query.query_type != QueryType::Select {
            return Err(QueryError::PlanningError(format!(
                "Unsupported query type: {:?}",
                query.query_type
            )));
        }

        let mut root = match query.from_tables.len() {
            0 => {
                return Err(QueryError::PlanningError(
                    "Query must reference at least one table".to_string(),
                ))
            }
            1 => self.scan(&query.from_tables[0]),
            2 => self.join_tree(query)?,
            n => {
                return Err(QueryError::PlanningError(format!(
                    "Queries over {} tables are not supported",
                    n
                )))
            }
        };

        if query.has_conditions() {
            root = PlanNode::filter(node_id("filter"), query.where_conditions.clone(), root);
        }

        if query.is_count() {
            root = PlanNode::aggregate(node_id("aggregate"), root);
        } else if !query.selects_all() {
            if query
                .select_columns
                .iter()
                .any(|c| c.eq_ignore_ascii_case("COUNT(*)"))
            {
                return Err(QueryError::PlanningError(
                    "COUNT(*) cannot be combined with other columns".to_string(),
                ));
            }
            root = PlanNode::project(node_id("project"), query.select_columns.clone(), root);
        }

        if root.depth() > MAX_PLAN_DEPTH {
            return Err(QueryError::PlanningError(format!(
                "Plan depth {} exceeds limit of {}",
                root.depth(),
                MAX_PLAN_DEPTH
            )));
        }

        let plan = QueryPlan {
            plan_id: format!("plan_{}", &Uuid::new_v4().to_string()[..8]),
            query_id: query.id.clone(),
            root,
            worker_ids: self.determine_workers(query),
            estimated_cost: self.estimate_cost(query),
            planning_time: start.elapsed(),
        };

        info!(
            "Created plan {} for query {}: root={}, workers={:?}, cost={:.1}",
            plan.plan_id, query.id, plan.root.node_type, plan.worker_ids, plan.estimated_cost
        );

        Ok(plan)
    }

    /// Union of the owners of every referenced table's shards, sorted
    pub fn determine_workers(&self, query: &Query) -> Vec<WorkerId> {
        let workers: BTreeSet<WorkerId> = query
            .from_tables
            .iter()
            .flat_map(|table| self.shard_manager.get_shards_for_table(table))
            .map(|shard| shard.worker_id)
            .collect();
        workers.into_iter().collect()
    }

    /// Diagnostic cost; never influences plan shape
    pub fn estimate_cost(&self, query: &Query) -> f64 {
        let rows: u64 = query
            .from_tables
            .iter()
            .map(|t| self.shard_manager.table_row_count(t))
            .sum();

        self.cost_model.base_cost
            + rows as f64 * self.cost_model.row_cost
            + query.where_conditions.len() as f64 * self.cost_model.condition_cost
            + query.joins.len() as f64 * self.cost_model.join_cost
    }

    fn scan(&self, table: &str) -> PlanNode {
        PlanNode::scan(table, self.shard_manager.table_row_count(table))
    }

    fn join_tree(&self, query: &Query) -> Result<PlanNode> {
        let join = query.joins.first().ok_or_else(|| {
            QueryError::PlanningError("Join query must specify JOIN conditions".to_string())
        })?;

        let left = self.scan(&join.left_table);
        let right = self.scan(&join.right_table);
        Ok(PlanNode::join(node_id("join"), join.clone(), left, right))
    }
}

/// `<kind>_<uuid8>`, unique per plan node
fn node_id(kind: &str) -> String {
    format!("{}_{}", kind, &Uuid::new_v4().to_string()[..8])
}

/// True when the plan's root combines per-worker counts
pub fn is_aggregate_plan(plan: &QueryPlan) -> bool {
    plan.root.node_type == NodeType::Aggregate
}
