//! Pipeline orchestrator: prompt → translate → sanitize → execute → format

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::executor::QueryExecutor;
use crate::prompt::PromptBuilder;
use crate::result::format_records;
use crate::sanitize::{Sanitizer, ValidatedStatement};
use crate::schema::SchemaDescriptor;
use crate::translate::Translator;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Upper bound on the translation stage
    pub translate_timeout: Option<Duration>,
    /// Admit INSERT/UPDATE/DELETE in addition to queries
    pub allow_mutation: bool,
    /// Ceiling on concurrently running requests
    pub max_concurrent_requests: Option<usize>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            translate_timeout: Some(Duration::from_secs(30)),
            allow_mutation: false,
            max_concurrent_requests: None,
        }
    }
}

/// Generated statement plus its rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    pub sql_query: String,
    pub result: Vec<Map<String, Value>>,
}

pub struct Pipeline {
    schema: RwLock<Arc<SchemaDescriptor>>,
    translator: Arc<dyn Translator>,
    executor: Arc<dyn QueryExecutor>,
    options: PipelineOptions,
    permits: Option<Semaphore>,
}

impl Pipeline {
    pub fn new(
        schema: Arc<SchemaDescriptor>,
        translator: Arc<dyn Translator>,
        executor: Arc<dyn QueryExecutor>,
        options: PipelineOptions,
    ) -> Self {
        let permits = options.max_concurrent_requests.map(Semaphore::new);
        Self {
            schema: RwLock::new(schema),
            translator,
            executor,
            options,
            permits,
        }
    }

    /// Snapshot of the current descriptor
    pub fn schema(&self) -> Arc<SchemaDescriptor> {
        self.schema
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Swap in a new descriptor; requests already running keep their snapshot
    pub fn replace_schema(&self, schema: Arc<SchemaDescriptor>) {
        info!(
            schema = %schema.name,
            version = schema.version,
            fingerprint = %schema.fingerprint(),
            "Replacing schema descriptor"
        );
        *self
            .schema
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = schema;
    }

    /// Answer one natural-language question
    pub async fn answer(&self, user_utterance: &str) -> Result<ResponseEnvelope> {
        self.answer_with(user_utterance, |_| {}).await
    }

    /// Like [`Pipeline::answer`], handing the validated statement to
    /// `on_validated` before it is executed
    #[tracing::instrument(name = "answer", skip_all, fields(request_id = %Uuid::new_v4()))]
    pub async fn answer_with<F>(&self, user_utterance: &str, on_validated: F) -> Result<ResponseEnvelope>
    where
        F: FnOnce(&ValidatedStatement) + Send,
    {
        let started = Instant::now();
        let outcome = self.run(user_utterance, on_validated).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(envelope) => info!(
                rows = envelope.result.len(),
                elapsed_ms,
                "Request answered"
            ),
            Err(e) => warn!(kind = e.kind(), elapsed_ms, error = %e, "Request failed"),
        }
        outcome
    }

    async fn run<F>(&self, user_utterance: &str, on_validated: F) -> Result<ResponseEnvelope>
    where
        F: FnOnce(&ValidatedStatement) + Send,
    {
        if user_utterance.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "No user input provided".to_string(),
            ));
        }

        // The semaphore is never closed, so acquisition only waits.
        let _permit = match &self.permits {
            Some(permits) => permits.acquire().await.ok(),
            None => None,
        };

        let schema = self.schema();
        let request = PromptBuilder::build(user_utterance, &schema)?;
        debug!(utterance = %request.user_utterance, "Prompt built");

        let translation = self.translator.translate(&request);
        let candidate = match self.options.translate_timeout {
            Some(limit) => tokio::time::timeout(limit, translation).await.map_err(|_| {
                PipelineError::TranslationUnavailable(format!(
                    "translation timed out after {}s",
                    limit.as_secs_f64()
                ))
            })??,
            None => translation.await?,
        };
        debug!(candidate = %candidate.as_str(), "Candidate received");

        let statement =
            Sanitizer::new(schema, self.options.allow_mutation).sanitize(&candidate)?;
        info!(sql = %statement.as_str(), "Statement validated");
        on_validated(&statement);

        let result = self.executor.execute(&statement).await?;
        debug!(columns = ?result.columns(), rows = result.row_count(), "Statement executed");

        Ok(ResponseEnvelope {
            result: format_records(&result),
            sql_query: statement.into_string(),
        })
    }
}
