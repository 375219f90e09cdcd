//! nl2sql core
//!
//! Translates a natural-language question into one SQL statement for a fixed,
//! known schema, checks it against a strict safety policy and runs it.
//! The language model and the database sit behind the [`Translator`] and
//! [`QueryExecutor`] traits so both can be replaced in tests.

pub mod error;
pub mod executor;
pub mod pipeline;
pub mod prompt;
pub mod result;
pub mod sanitize;
pub mod schema;
pub mod translate;

pub use error::{PipelineError, Result, UnsafeReason};
pub use executor::QueryExecutor;
pub use pipeline::{Pipeline, PipelineOptions, ResponseEnvelope};
pub use prompt::{PromptBuilder, TranslationRequest};
pub use result::{format_records, ResultSet, Scalar};
pub use sanitize::{Sanitizer, ValidatedStatement};
pub use schema::{
    ColumnDescriptor, ColumnType, PromptExample, Relationship, SchemaDescriptor, SchemaError,
    TableDescriptor,
};
pub use translate::{CandidateStatement, Translator};
