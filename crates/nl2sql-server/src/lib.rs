//! nl2sql server
//!
//! Wires the core pipeline to its collaborators: an OpenAI translator, a DuckDB
//! executor, YAML configuration and structured logging. Exposes the pipeline
//! over HTTP and a console prompt.

pub mod config;
pub mod http;
pub mod llm;
pub mod logging;

use std::sync::Arc;

use nl2sql_core::Pipeline;
use nl2sql_duck::DuckExecutor;
use tracing::info;

use crate::config::Config;
use crate::llm::OpenAiTranslator;

/// Build the pipeline described by `config`
pub fn build_pipeline(config: &Config) -> anyhow::Result<Pipeline> {
    let schema = config.resolve_schema()?;
    info!(
        schema = %schema.name,
        version = schema.version,
        tables = schema.tables.len(),
        fingerprint = %schema.fingerprint(),
        "Schema descriptor loaded"
    );

    let api_key = Config::get_openai_api_key()?;
    let translator = OpenAiTranslator::new(api_key, &config.translator);
    info!("Using OpenAI model: {}", translator.model());

    let executor = open_executor(config)?;

    Ok(Pipeline::new(
        Arc::new(schema),
        Arc::new(translator),
        Arc::new(executor),
        config.pipeline_options(),
    ))
}

fn open_executor(config: &Config) -> anyhow::Result<DuckExecutor> {
    let read_only = !config.execution.allow_mutation && config.database.bootstrap_sql.is_none();
    let executor = match &config.database.path {
        Some(path) => {
            info!(path = %path, read_only, "Opening DuckDB database");
            DuckExecutor::open(path, read_only)?
        }
        None => {
            info!("Opening in-memory DuckDB database");
            DuckExecutor::new()?
        }
    }
    .with_statement_timeout(config.statement_timeout());

    if let Some(path) = &config.database.bootstrap_sql {
        let sql = std::fs::read_to_string(path)?;
        executor.bootstrap(&sql)?;
    }
    executor.disable_external_access()?;

    Ok(executor)
}
