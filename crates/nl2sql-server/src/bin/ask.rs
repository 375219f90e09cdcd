//! Console mode: ask one question, print the generated SQL and its rows

use std::io::{self, BufRead, Write};

use nl2sql_server::config::Config;
use nl2sql_server::{build_pipeline, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config_path = std::env::var("NL2SQL_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let mut config = Config::load_or_default(&config_path)?;
    // Keep the console readable unless the operator asked for more.
    if std::env::var("RUST_LOG").is_err() {
        config.logging.level = "warn".to_string();
    }
    logging::init(&config.logging);

    let pipeline = build_pipeline(&config)?;

    println!("Welcome! Ask your query:");
    io::stdout().flush()?;
    let mut question = String::new();
    io::stdin().lock().read_line(&mut question)?;

    let outcome = pipeline
        .answer_with(&question, |statement| {
            println!("Generated SQL Query: {}", statement.as_str())
        })
        .await;
    match outcome {
        Ok(envelope) => {
            println!("Query Results:");
            println!("{}", serde_json::to_string_pretty(&envelope.result)?);
        }
        Err(e) => println!("Error executing query: {}", e),
    }
    Ok(())
}
