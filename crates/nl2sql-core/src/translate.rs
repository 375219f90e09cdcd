//! Translator seam over the external language-model capability

use async_trait::async_trait;

use crate::error::Result;
use crate::prompt::TranslationRequest;

/// Raw text returned by a translator; untrusted until sanitized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateStatement(String);

impl CandidateStatement {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CandidateStatement {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// Turns a translation request into candidate SQL text.
///
/// Implementations make exactly one outbound call per request (plus any
/// capped retries of their own) and never inspect the SQL they return.
/// Failures map to `TranslationUnavailable` or `EmptyTranslation`.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, request: &TranslationRequest) -> Result<CandidateStatement>;
}
