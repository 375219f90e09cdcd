//! Configuration system for the nl2sql server
//!
//! Loads configuration from:
//! 1. config.yaml - operational settings and the schema descriptor
//! 2. .env file - secrets (API keys)
//!
//! Environment variables always override config.yaml values.

use nl2sql_core::{PipelineOptions, SchemaDescriptor, SchemaError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("No schema configured: set `schema` or `schema_path`")]
    MissingSchema,

    #[error("Both `schema` and `schema_path` are set; use one")]
    AmbiguousSchema,

    #[error("Invalid schema: {0}")]
    InvalidSchema(#[from] SchemaError),
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// DuckDB file; in-memory when absent
    pub path: Option<String>,

    /// SQL file run once at startup, before external access is disabled
    pub bootstrap_sql: Option<String>,
}

/// Translation capability configuration (credentials come from the environment)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    pub model: String,
    pub temperature: f32,
    pub api_base: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            api_base: None,
            timeout_secs: 30,
            max_retries: 0,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

/// Execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub statement_timeout_secs: u64,

    /// Admit INSERT/UPDATE/DELETE; DDL stays forbidden either way
    pub allow_mutation: bool,

    pub max_concurrent_requests: Option<usize>,

    /// Include rejection and engine messages in error payloads
    pub expose_error_detail: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            statement_timeout_secs: 30,
            allow_mutation: false,
            max_concurrent_requests: None,
            expose_error_detail: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stdout, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "stdout".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub translator: TranslatorConfig,
    pub execution: ExecutionConfig,
    pub logging: LoggingConfig,
    pub schema: Option<SchemaDescriptor>,
    pub schema_path: Option<String>,
}

impl Config {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Like [`Config::load`], falling back to defaults when the file is absent
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            return Self::load(path);
        }
        let mut config = Config::default();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("NL2SQL_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("NL2SQL_SERVER_PORT") {
            if let Ok(port_num) = port.parse() {
                self.server.port = port_num;
            }
        }

        if let Some(path) = lookup("NL2SQL_DATABASE_PATH") {
            self.database.path = Some(path);
        }
        if let Some(model) = lookup("NL2SQL_MODEL") {
            self.translator.model = model;
        }
        if let Some(flag) = lookup("NL2SQL_ALLOW_MUTATION") {
            if let Ok(allow) = flag.parse() {
                self.execution.allow_mutation = allow;
            }
        }

        if let Some(level) = lookup("RUST_LOG") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(output) = lookup("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Some(dir) = lookup("LOG_DIR") {
            self.logging.directory = dir;
        }
    }

    /// Get OpenAI API key from environment (must be in .env)
    pub fn get_openai_api_key() -> Result<String, ConfigError> {
        std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))
    }

    /// The configured descriptor, normalized and validated
    pub fn resolve_schema(&self) -> Result<SchemaDescriptor, ConfigError> {
        let schema = match (&self.schema, &self.schema_path) {
            (Some(_), Some(_)) => return Err(ConfigError::AmbiguousSchema),
            (Some(inline), None) => inline.clone(),
            (None, Some(path)) => serde_yaml::from_str(&std::fs::read_to_string(path)?)?,
            (None, None) => return Err(ConfigError::MissingSchema),
        };
        Ok(schema.normalize()?)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            translate_timeout: Some(Duration::from_secs(self.translator.timeout_secs)),
            allow_mutation: self.execution.allow_mutation,
            max_concurrent_requests: self.execution.max_concurrent_requests,
        }
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.execution.statement_timeout_secs)
    }
}
