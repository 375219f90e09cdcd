//! Error taxonomy shared by every pipeline stage

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Why the sanitizer refused a candidate statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsafeReason {
    /// Nothing left after whitespace and fence cleanup
    Empty,
    /// Backtick fence that does not follow the opening-line/closing-line shape
    MalformedFence,
    /// Text the SQL parser could not classify
    Unparseable(String),
    /// More than one statement in a single candidate
    StackedStatements(usize),
    /// A statement kind outside the allow-list (DDL, or DML on a read-only deployment)
    DisallowedStatement(String),
    /// A relation that is neither a schema table nor a CTE of the statement
    UnknownRelation(String),
}

impl fmt::Display for UnsafeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnsafeReason::Empty => write!(f, "statement is empty"),
            UnsafeReason::MalformedFence => write!(f, "malformed code fence around statement"),
            UnsafeReason::Unparseable(msg) => write!(f, "statement could not be parsed: {}", msg),
            UnsafeReason::StackedStatements(n) => {
                write!(f, "expected a single statement, found {}", n)
            }
            UnsafeReason::DisallowedStatement(kind) => {
                write!(f, "statement kind not permitted: {}", kind)
            }
            UnsafeReason::UnknownRelation(name) => {
                write!(f, "relation not present in schema: {}", name)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Translation service unavailable: {0}")]
    TranslationUnavailable(String),

    #[error("Translation service returned no usable text")]
    EmptyTranslation,

    #[error("Unsafe statement: {0}")]
    UnsafeStatement(UnsafeReason),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Query timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
}

impl PipelineError {
    /// Stable tag used by outer transports
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(_) => "invalid_input",
            PipelineError::TranslationUnavailable(_) => "translation_unavailable",
            PipelineError::EmptyTranslation => "empty_translation",
            PipelineError::UnsafeStatement(_) => "unsafe_statement",
            PipelineError::ExecutionError(_) => "execution_error",
            PipelineError::Timeout(_) => "timeout",
        }
    }

    /// Caller errors, as opposed to failures inside the pipeline
    pub fn is_caller_error(&self) -> bool {
        matches!(self, PipelineError::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_are_distinct() {
        let errors = [
            PipelineError::InvalidInput("empty".into()),
            PipelineError::TranslationUnavailable("down".into()),
            PipelineError::EmptyTranslation,
            PipelineError::UnsafeStatement(UnsafeReason::Empty),
            PipelineError::ExecutionError("boom".into()),
            PipelineError::Timeout(Duration::from_secs(1)),
        ];
        let mut kinds: Vec<_> = errors.iter().map(|e| e.kind()).collect();
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn test_unsafe_message_includes_reason() {
        let err = PipelineError::UnsafeStatement(UnsafeReason::StackedStatements(2));
        assert_eq!(
            err.to_string(),
            "Unsafe statement: expected a single statement, found 2"
        );
        assert!(!err.is_caller_error());
    }
}
