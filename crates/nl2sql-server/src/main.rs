//! nl2sql HTTP server
//!
//! Accepts natural language questions, converts them to SQL using OpenAI,
//! validates the SQL and executes it against DuckDB.

use std::sync::Arc;

use nl2sql_server::config::Config;
use nl2sql_server::http::{self, AppState};
use nl2sql_server::{build_pipeline, logging};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config_path = std::env::var("NL2SQL_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load_or_default(&config_path)?;

    logging::init(&config.logging);
    info!(config = %config_path, "Configuration loaded");

    let pipeline = build_pipeline(&config)?;
    let state = AppState {
        pipeline: Arc::new(pipeline),
        expose_error_detail: config.execution.expose_error_detail,
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(
        allow_mutation = config.execution.allow_mutation,
        statement_timeout_s = config.execution.statement_timeout_secs,
        "Starting nl2sql server on {}",
        addr
    );

    http::serve(&addr, state).await?;
    Ok(())
}
