//! pooldb - run statements through a pooled database connection.

use clap::Parser;
use pooldb::config::{Command, Config, PoolConfig};
use pooldb::{BindValue, PoolManager, QueryExecutor, QueryOptions};
use serde_json::Value as JsonValue;
use std::error::Error;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

/// Bind arguments are JSON literals (`42`, `true`, `null`, `"text"`);
/// anything that doesn't parse is taken as plain text.
fn parse_bind(raw: &str) -> BindValue {
    serde_json::from_str::<JsonValue>(raw)
        .map(BindValue::from)
        .unwrap_or_else(|_| BindValue::Text(raw.to_string()))
}

async fn run(executor: &QueryExecutor, command: &Command) -> Result<JsonValue, Box<dyn Error>> {
    match command {
        Command::Ping => {
            executor.pool().initialize().await?;
            Ok(serde_json::to_value(executor.pool().statistics().await)?)
        }
        Command::Query {
            sql,
            binds,
            max_rows,
        } => {
            let binds: Vec<BindValue> = binds.iter().map(|b| parse_bind(b)).collect();
            let mut options = QueryOptions::new();
            options.max_rows = *max_rows;
            let rows = executor.query(sql, &binds, &options).await?;
            Ok(serde_json::to_value(rows)?)
        }
        Command::Execute {
            sql,
            binds,
            dry_run,
        } => {
            let binds: Vec<BindValue> = binds.iter().map(|b| parse_bind(b)).collect();
            let rows_affected = executor.execute(sql, &binds, !dry_run).await?;
            Ok(serde_json::json!({
                "rows_affected": rows_affected,
                "committed": !dry_run,
            }))
        }
        Command::Count { table } => {
            let count = executor.row_count(table).await?;
            Ok(serde_json::json!({ "table": table, "count": count }))
        }
        Command::Stats => {
            executor
                .get_one("SELECT 1", &[], &QueryOptions::default())
                .await?;
            Ok(serde_json::to_value(executor.pool().statistics().await)?)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    info!("Starting pooldb v{}", env!("CARGO_PKG_VERSION"));

    PoolConfig::warn_missing_env();
    config.pool.log_summary();

    let manager = Arc::new(PoolManager::new(config.pool.clone()));
    let executor = QueryExecutor::new(Arc::clone(&manager));

    let outcome = run(&executor, &config.command).await;
    manager.shutdown(config.pool.drain_timeout()).await?;

    match outcome {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            Err(e)
        }
    }
}
