//! Executor seam over the database

use async_trait::async_trait;

use crate::error::Result;
use crate::result::ResultSet;
use crate::sanitize::ValidatedStatement;

/// Runs a validated statement verbatim and materializes every row.
///
/// Implementations acquire a session per call and release it on every exit
/// path. Engine failures map to `ExecutionError` with the engine's message;
/// exceeding the statement timeout maps to `Timeout` and must cancel the
/// statement inside the engine. Zero rows is a successful, empty result.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, statement: &ValidatedStatement) -> Result<ResultSet>;
}
