//! OpenAI-backed translator for natural language to SQL

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use nl2sql_core::{CandidateStatement, PipelineError, TranslationRequest, Translator};
use tracing::{debug, warn};

use crate::config::TranslatorConfig;

/// Capped exponential backoff for transport-level failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl From<&TranslatorConfig> for RetryPolicy {
    fn from(config: &TranslatorConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

pub struct OpenAiTranslator {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    retry: RetryPolicy,
}

impl OpenAiTranslator {
    pub fn new(api_key: String, config: &TranslatorConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = &config.api_base {
            openai_config = openai_config.with_api_base(base);
        }

        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            temperature: config.temperature,
            retry: RetryPolicy::from(config),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn chat_request(
        &self,
        request: &TranslationRequest,
    ) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(request.system_message())
                    .build()?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(request.user_message())
                    .build()?,
            ),
        ];

        CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(messages)
            .temperature(self.temperature)
            .build()
    }
}

#[async_trait]
impl Translator for OpenAiTranslator {
    async fn translate(
        &self,
        request: &TranslationRequest,
    ) -> nl2sql_core::Result<CandidateStatement> {
        let chat_request = self
            .chat_request(request)
            .map_err(|e| PipelineError::TranslationUnavailable(e.to_string()))?;

        let mut attempt = 0;
        loop {
            match self.client.chat().create(chat_request.clone()).await {
                Ok(response) => {
                    let content = response
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.message.content);
                    debug!(model = %self.model, attempt = attempt + 1, "LLM response received");
                    return candidate_from(content);
                }
                Err(e) if attempt < self.retry.max_retries && is_retryable(&e) => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Translation call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(PipelineError::TranslationUnavailable(e.to_string())),
            }
        }
    }
}

/// First choice's text, or `EmptyTranslation` when there is nothing usable
pub fn candidate_from(content: Option<String>) -> nl2sql_core::Result<CandidateStatement> {
    content
        .filter(|text| !text.trim().is_empty())
        .map(CandidateStatement::new)
        .ok_or(PipelineError::EmptyTranslation)
}

fn is_retryable(err: &OpenAIError) -> bool {
    match err {
        OpenAIError::Reqwest(_) => true,
        OpenAIError::ApiError(api) => api
            .r#type
            .as_deref()
            .is_some_and(|t| t == "server_error" || t == "rate_limit_exceeded"),
        _ => false,
    }
}
