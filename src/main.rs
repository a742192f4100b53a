//! safe-sql - SQL execution gateway with read-only enforcement.

use std::sync::Arc;

use anyhow::{Context, Result};
use safe_sql_gateway::cli::{run_tool_loop, Cli};
use safe_sql_gateway::connection::ConnectorManager;
use safe_sql_gateway::logging;
use safe_sql_gateway::query::QueryExecutor;
use safe_sql_gateway::staging::ResultStager;
use safe_sql_gateway::tools::ToolRegistry;
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // .env is optional
    let _ = dotenvy::dotenv();
    logging::init_stderr_logging();

    if let Err(e) = run(Cli::parse_args()).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.load_config()?;
    for source in &config.sources {
        info!("Source: {}", source.display_string());
    }

    let connectors = Arc::new(ConnectorManager::from_config(&config));
    connectors
        .connect_all()
        .await
        .context("Failed to connect to configured sources")?;

    let staging_dir = cli.staging_dir();
    info!("Staging results in {}", staging_dir.display());
    let executor = QueryExecutor::new(Arc::new(ResultStager::new(staging_dir)));

    let registry = ToolRegistry::initialize(&config, cli.destructive, connectors.clone(), executor)?;
    info!("Tools: {}", registry.tool_names().join(", "));

    let result = match &cli.sql {
        Some(sql) => {
            let response = registry.execute_sql(&cli.tool, sql).await;
            let mut line = serde_json::to_vec(&response)?;
            line.push(b'\n');
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&line).await?;
            stdout.flush().await?;
            Ok(())
        }
        None => run_tool_loop(
            &registry,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
        .await
        .map_err(anyhow::Error::from),
    };

    connectors.disconnect_all().await;
    result
}
