use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::*;
use config::Config;

#[derive(Parser)]
#[command(name = "dsql")]
#[command(author, version, about = "dsql - Distributed SQL query engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory of <table>.csv files to load instead of the demo data
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Slice each table into this many partitions across workers
    #[arg(short, long, global = true)]
    partitions: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a SQL query
    Query {
        /// SQL query to execute
        sql: String,

        /// Print the execution plan first
        #[arg(short, long)]
        explain: bool,
    },

    /// Show coordinator and worker status
    Status,

    /// Show the shard layout
    Shards,

    /// Run the demo queries
    Demo,

    /// Write the effective configuration to a file
    InitConfig {
        /// Output file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose)?;

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };
    if cli.data_dir.is_some() {
        config.data_dir = cli.data_dir;
    }
    if cli.partitions.is_some() {
        config.partitions = cli.partitions;
    }

    if let Some(Commands::InitConfig { path }) = &cli.command {
        config.save(path)?;
        println!("{} Configuration written to {}", "✓".bright_green(), path.display());
        return Ok(());
    }

    print_banner();
    let cluster = start_cluster(&config).await?;
    tracing::info!("Cluster ready with {} workers", cluster.workers().len());

    match cli.command {
        Some(Commands::Query { sql, explain }) => {
            config.show_plan |= explain;
            if !run_query(&cluster, &config, &sql).await? {
                std::process::exit(1);
            }
        }
        Some(Commands::Status) => {
            show_status(&cluster).await?;
        }
        Some(Commands::Shards) => {
            show_shards(&cluster)?;
        }
        Some(Commands::Demo) | None => {
            run_demo(&cluster, &config).await?;
            show_status(&cluster).await?;
        }
        Some(Commands::InitConfig { .. }) => {}
    }

    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        "dsql_cli=debug,dsql_core=debug,dsql_parser=debug,dsql_storage=debug,dsql_distributed=debug"
    } else {
        "dsql_cli=info,dsql_distributed=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
     _           _
  __| |___  __ _| |
 / _` / __|/ _` | |
| (_| \__ \ (_| | |
 \__,_|___/\__, |_|
              |_|
    "#
        .bright_cyan()
    );
    println!(
        "{}",
        "Distributed SQL Query Engine v0.1.0".bright_yellow()
    );
    println!();
}
