//! DuckDB executor for validated statements
//!
//! One root connection is held for the life of the process. Each request
//! clones a session from it, runs the statement on a blocking worker and
//! drops the session when the worker finishes, whatever the outcome.

use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use duckdb::types::{TimeUnit, ValueRef};
use duckdb::{AccessMode, Config, Connection, Result as DuckResult};
use nl2sql_core::{PipelineError, QueryExecutor, ResultSet, Scalar, ValidatedStatement};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("Query timeout after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Session unavailable: {0}")]
    Session(String),

    #[error("Malformed result: {0}")]
    Shape(String),
}

impl From<ExecutionError> for PipelineError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Timeout(limit) => PipelineError::Timeout(limit),
            ExecutionError::Database(e) => PipelineError::ExecutionError(e.to_string()),
            other => PipelineError::ExecutionError(other.to_string()),
        }
    }
}

pub struct DuckExecutor {
    root: Mutex<Connection>,
    statement_timeout: Duration,
}

impl DuckExecutor {
    pub fn new() -> DuckResult<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    /// Open a database file; `read_only` rejects writes inside the engine as well
    pub fn open<P: AsRef<Path>>(path: P, read_only: bool) -> DuckResult<Self> {
        let conn = if read_only {
            let config = Config::default().access_mode(AccessMode::ReadOnly)?;
            Connection::open_with_flags(path, config)?
        } else {
            Connection::open(path)?
        };
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            root: Mutex::new(conn),
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT,
        }
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// Run operator-supplied setup SQL on the root connection
    pub fn bootstrap(&self, sql: &str) -> Result<(), ExecutionError> {
        let root = self
            .root
            .lock()
            .map_err(|e| ExecutionError::Session(e.to_string()))?;
        root.execute_batch(sql)?;
        info!("Bootstrap SQL applied");
        Ok(())
    }

    /// Forbid file and network access from SQL for the rest of the process
    pub fn disable_external_access(&self) -> Result<(), ExecutionError> {
        let root = self
            .root
            .lock()
            .map_err(|e| ExecutionError::Session(e.to_string()))?;
        root.execute_batch("SET enable_external_access = false")?;
        info!("External access disabled");
        Ok(())
    }

    pub fn statement_timeout(&self) -> Duration {
        self.statement_timeout
    }

    fn session(&self) -> Result<Connection, ExecutionError> {
        let root = self
            .root
            .lock()
            .map_err(|e| ExecutionError::Session(e.to_string()))?;
        Ok(root.try_clone()?)
    }
}

#[async_trait]
impl QueryExecutor for DuckExecutor {
    async fn execute(&self, statement: &ValidatedStatement) -> nl2sql_core::Result<ResultSet> {
        let session = self.session()?;
        let interrupt = session.interrupt_handle();
        let sql = statement.as_str().to_string();
        let limit = self.statement_timeout;
        debug!(mutating = statement.is_mutating(), "Executing statement");

        let started = Instant::now();
        // The session moves into the worker and is dropped when it returns.
        let worker = tokio::task::spawn_blocking(move || materialize(&session, &sql));

        match tokio::time::timeout(limit, worker).await {
            Ok(Ok(outcome)) => {
                let result = outcome?;
                info!(
                    rows = result.row_count(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Statement completed"
                );
                Ok(result)
            }
            Ok(Err(join)) => Err(ExecutionError::Session(join.to_string()).into()),
            Err(_) => {
                interrupt.interrupt();
                warn!(timeout_s = limit.as_secs_f64(), "Statement interrupted after timeout");
                Err(ExecutionError::Timeout(limit).into())
            }
        }
    }
}

/// Run `sql` and collect every row before returning
fn materialize(conn: &Connection, sql: &str) -> Result<ResultSet, ExecutionError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let columns = rows
        .as_ref()
        .map(|stmt| stmt.column_names())
        .unwrap_or_default();
    let width = columns.len();

    let mut result = ResultSet::new(columns);
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(width);
        for i in 0..width {
            cells.push(to_scalar(row.get_ref(i)?));
        }
        result.push_row(cells).map_err(ExecutionError::Shape)?;
    }
    Ok(result)
}

fn to_scalar(value: ValueRef<'_>) -> Scalar {
    match value {
        ValueRef::Null => Scalar::Null,
        ValueRef::Boolean(b) => Scalar::Bool(b),
        ValueRef::TinyInt(i) => Scalar::Int(i.into()),
        ValueRef::SmallInt(i) => Scalar::Int(i.into()),
        ValueRef::Int(i) => Scalar::Int(i.into()),
        ValueRef::BigInt(i) => Scalar::Int(i),
        ValueRef::HugeInt(i) => i64::try_from(i)
            .map(Scalar::Int)
            .unwrap_or_else(|_| Scalar::BigInt(i.to_string())),
        ValueRef::UTinyInt(i) => Scalar::Int(i.into()),
        ValueRef::USmallInt(i) => Scalar::Int(i.into()),
        ValueRef::UInt(i) => Scalar::Int(i.into()),
        ValueRef::UBigInt(i) => i64::try_from(i)
            .map(Scalar::Int)
            .unwrap_or_else(|_| Scalar::BigInt(i.to_string())),
        ValueRef::Float(f) => Scalar::Float(f.into()),
        ValueRef::Double(f) => Scalar::Float(f),
        ValueRef::Decimal(d) => Scalar::Decimal(d.to_string()),
        ValueRef::Text(s) => Scalar::Text(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => Scalar::Text(format!("<blob {} bytes>", b.len())),
        ValueRef::Date32(days) => date_from_days(days),
        ValueRef::Timestamp(unit, v) => timestamp_from(unit, v),
        ValueRef::Time64(unit, v) => time_from(unit, v),
        other => Scalar::Text(format!("{:?}", other)),
    }
}

fn to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

// 1970-01-01 counted from 0001-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn date_from_days(days: i32) -> Scalar {
    days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)
        .and_then(chrono::NaiveDate::from_num_days_from_ce_opt)
        .map(|d| Scalar::Temporal(d.format("%Y-%m-%d").to_string()))
        .unwrap_or_else(|| Scalar::Text(days.to_string()))
}

fn timestamp_from(unit: TimeUnit, value: i64) -> Scalar {
    chrono::DateTime::from_timestamp_micros(to_micros(unit, value))
        .map(|ts| {
            Scalar::Temporal(ts.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        })
        .unwrap_or_else(|| Scalar::Text(value.to_string()))
}

fn time_from(unit: TimeUnit, value: i64) -> Scalar {
    let micros = to_micros(unit, value);
    let secs = u32::try_from(micros.div_euclid(1_000_000)).ok();
    let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1_000).ok();
    secs.zip(nanos)
        .and_then(|(s, n)| chrono::NaiveTime::from_num_seconds_from_midnight_opt(s, n))
        .map(|t| Scalar::Temporal(t.format("%H:%M:%S%.f").to_string()))
        .unwrap_or_else(|| Scalar::Text(value.to_string()))
}
