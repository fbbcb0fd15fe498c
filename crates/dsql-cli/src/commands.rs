use crate::config::Config;
use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, Color, Table as ComfyTable};
use dsql_core::WorkerId;
use dsql_distributed::network::QueryResultPayload;
use dsql_distributed::{ExecuteQueryRequest, LocalCluster, SimulatedMetrics};

/// Queries run by `dsql demo`
pub const DEMO_QUERIES: &[&str] = &[
    "SELECT * FROM users",
    "SELECT name, age FROM users WHERE age > 30",
    "SELECT COUNT(*) FROM orders",
    "SELECT product, amount FROM orders WHERE status = 'completed' AND amount >= 50",
    "SELECT name, price FROM products WHERE category IN ('Electronics', 'Sports')",
    "SELECT name FROM users WHERE email LIKE '%@email.com' AND city <> 'Texas'",
    "SELECT users.name, orders.product FROM users JOIN orders ON users.user_id = orders.user_id",
];

pub async fn start_cluster(config: &Config) -> Result<LocalCluster> {
    let (store, schemas) = config.load_data()?;
    let cluster = LocalCluster::builder()
        .config(config.coordinator_config())
        .workers(config.worker_configs())
        .shards(config.shards.clone())
        .data(store, schemas)
        .heartbeats(true)
        .build()
        .await?;
    Ok(cluster)
}

pub async fn run_query(cluster: &LocalCluster, config: &Config, sql: &str) -> Result<bool> {
    println!("{} {}", "→".bright_blue(), sql.bright_white());

    if config.show_plan {
        match cluster.coordinator().explain(sql) {
            Ok(plan) => {
                println!("{}", "Plan:".bright_yellow());
                print!("{}", plan.root.explain());
                println!(
                    "{} {}  {} {:.1}",
                    "Workers:".bright_yellow(),
                    plan.worker_ids
                        .iter()
                        .map(|w| w.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                    "Cost:".bright_yellow(),
                    plan.estimated_cost
                );
            }
            Err(e) => println!("{} {}", "✗".bright_red(), e),
        }
    }

    let response = cluster
        .execute_query(ExecuteQueryRequest::new(sql))
        .await;

    if !response.success {
        println!("{} {}", "✗".bright_red(), response.message.bright_red());
        println!();
        return Ok(false);
    }

    if let Some(result) = &response.result {
        println!("{}", render_result(result, config.max_rows));
        let mut summary = format!(
            "{} rows in {}ms",
            result.rows_returned, result.execution_time_ms
        );
        if result.rows_returned > config.max_rows {
            summary.push_str(&format!(" (showing first {})", config.max_rows));
        }
        println!("{} {}", "✓".bright_green(), summary.bright_black());
    }
    println!();
    Ok(true)
}

pub fn render_result(result: &QueryResultPayload, max_rows: usize) -> ComfyTable {
    let mut table = ComfyTable::new();
    table.set_header(
        result
            .column_names
            .iter()
            .map(|c| Cell::new(c).fg(Color::Cyan))
            .collect::<Vec<_>>(),
    );

    for row in result.rows.iter().take(max_rows) {
        table.add_row(row.values.clone());
    }
    table
}

pub async fn show_status(cluster: &LocalCluster) -> Result<()> {
    cluster.heartbeat_all(&SimulatedMetrics::default());
    let status = cluster.coordinator().system_status();

    println!("{}", "System Status:".bright_yellow().bold());
    println!(
        "  Uptime: {}s  Total queries: {}  Active queries: {}",
        status.uptime_seconds, status.total_queries, status.active_queries
    );

    let mut table = ComfyTable::new();
    table.set_header(vec![
        Cell::new("Component").fg(Color::Cyan),
        Cell::new("Status").fg(Color::Yellow),
        Cell::new("CPU %").fg(Color::Green),
        Cell::new("Memory %").fg(Color::Green),
        Cell::new("Active").fg(Color::Magenta),
        Cell::new("Probe").fg(Color::Magenta),
    ]);

    for (name, component) in &status.components {
        let worker_id = WorkerId::from(name.as_str());
        let probe = if cluster.worker(&worker_id).is_some() {
            if cluster.coordinator().check_worker_health(&worker_id).await {
                "ok"
            } else {
                "failed"
            }
        } else {
            "-"
        };
        let status_cell = if component.status == "HEALTHY" {
            Cell::new(&component.status).fg(Color::Green)
        } else {
            Cell::new(&component.status).fg(Color::Red)
        };

        table.add_row(vec![
            Cell::new(name),
            status_cell,
            Cell::new(format!("{:.1}", component.cpu_usage)),
            Cell::new(format!("{:.1}", component.memory_usage)),
            Cell::new(component.active_connections),
            Cell::new(probe),
        ]);
    }

    println!("{}", table);
    Ok(())
}

pub fn show_shards(cluster: &LocalCluster) -> Result<()> {
    let shards = cluster.coordinator().shard_manager();

    let mut table = ComfyTable::new();
    table.set_header(vec![
        Cell::new("Shard").fg(Color::Cyan),
        Cell::new("Table").fg(Color::Yellow),
        Cell::new("Worker").fg(Color::Green),
        Cell::new("Key Range").fg(Color::Magenta),
        Cell::new("Rows").fg(Color::Magenta),
    ]);

    for name in shards.tables() {
        for shard in shards.get_shards_for_table(&name) {
            table.add_row(vec![
                shard.shard_id.clone(),
                shard.table_name.clone(),
                shard.worker_id.to_string(),
                format!("{}..{}", shard.start_key, shard.end_key),
                shard.row_count.to_string(),
            ]);
        }
    }

    println!("{}", "Shard Layout:".bright_yellow().bold());
    println!("{}", table);

    for (name, workers) in shards.shard_distribution() {
        let owners: Vec<&str> = workers.iter().map(|w| w.as_str()).collect();
        println!("  {} → {}", name.bright_cyan(), owners.join(", "));
    }
    println!(
        "  {} {}",
        "Total rows:".bright_yellow(),
        shards.total_rows()
    );
    Ok(())
}

pub async fn run_demo(cluster: &LocalCluster, config: &Config) -> Result<()> {
    println!("{}", "Running demo queries".bright_yellow().bold());
    println!();

    let mut succeeded = 0;
    for sql in DEMO_QUERIES {
        if run_query(cluster, config, sql).await? {
            succeeded += 1;
        }
    }

    println!(
        "{} {}/{} queries succeeded",
        "✓".bright_green(),
        succeeded,
        DEMO_QUERIES.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsql_core::{QueryStatus, Row};

    fn payload(rows: usize) -> QueryResultPayload {
        QueryResultPayload {
            query_id: "q1".to_string(),
            sql: "SELECT name FROM users".to_string(),
            column_names: vec!["name".to_string()],
            rows: (0..rows).map(|i| Row::new(vec![format!("user{}", i)])).collect(),
            rows_returned: rows,
            execution_time_ms: 3,
            status: QueryStatus::Completed,
        }
    }

    #[test]
    fn test_render_result_truncates() {
        let table = render_result(&payload(5), 2);
        assert_eq!(table.row_iter().count(), 2);

        let rendered = table.to_string();
        assert!(rendered.contains("name"));
        assert!(rendered.contains("user1"));
        assert!(!rendered.contains("user2"));
    }

    #[tokio::test]
    async fn test_demo_queries_succeed_without_faults() {
        let config = Config {
            failure_probability: 0.0,
            ..Config::default()
        };
        let cluster = start_cluster(&config).await.unwrap();

        for sql in DEMO_QUERIES {
            assert!(run_query(&cluster, &config, sql).await.unwrap(), "{}", sql);
        }
        assert_eq!(
            cluster.coordinator().system_status().total_queries,
            DEMO_QUERIES.len() as u64
        );
    }
}
