//! Full pipeline runs against an in-memory DuckDB seeded with `erp.invoice`.
//!
//! The translator is a fixed-reply fake; no model is contacted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use nl2sql_core::{
    CandidateStatement, ColumnDescriptor, ColumnType, Pipeline, PipelineError, PipelineOptions,
    QueryExecutor, ResultSet, SchemaDescriptor, TableDescriptor, TranslationRequest, Translator,
    ValidatedStatement,
};
use nl2sql_duck::DuckExecutor;
use serde_json::{json, Value};

struct FixedTranslator {
    reply: String,
    calls: AtomicUsize,
    last_user_message: std::sync::Mutex<Option<String>>,
}

impl FixedTranslator {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
            last_user_message: std::sync::Mutex::new(None),
        })
    }
}

#[async_trait]
impl Translator for FixedTranslator {
    async fn translate(&self, request: &TranslationRequest) -> nl2sql_core::Result<CandidateStatement> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_user_message.lock().unwrap() = Some(request.user_message());
        Ok(CandidateStatement::new(self.reply.clone()))
    }
}

/// Counts calls before delegating to DuckDB
struct CountingExecutor {
    inner: DuckExecutor,
    calls: AtomicUsize,
}

#[async_trait]
impl QueryExecutor for CountingExecutor {
    async fn execute(&self, statement: &ValidatedStatement) -> nl2sql_core::Result<ResultSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(statement).await
    }
}

fn schema() -> Arc<SchemaDescriptor> {
    let schema = SchemaDescriptor::new(
        "erp",
        vec![TableDescriptor::new(
            "invoice",
            vec![
                ColumnDescriptor::new("product_name", ColumnType::Varchar),
                ColumnDescriptor::new("invoiced_qty", ColumnType::Integer),
            ],
        )],
    );
    Arc::new(schema.normalize().unwrap())
}

fn executor() -> Arc<CountingExecutor> {
    let inner = DuckExecutor::new().unwrap();
    inner
        .bootstrap(
            "CREATE SCHEMA erp;
             CREATE TABLE erp.invoice (product_name VARCHAR, invoiced_qty INTEGER);
             INSERT INTO erp.invoice VALUES ('A', 3), ('A', 2);",
        )
        .unwrap();
    Arc::new(CountingExecutor {
        inner,
        calls: AtomicUsize::new(0),
    })
}

#[tokio::test]
async fn test_total_quantity_invoiced_per_product() {
    let translator = FixedTranslator::new(
        "```sql\nSELECT product_name, SUM(invoiced_qty) AS total\nFROM erp.invoice\nGROUP BY product_name;\n```",
    );
    let executor = executor();
    let pipeline = Pipeline::new(
        schema(),
        translator.clone(),
        executor.clone(),
        PipelineOptions::default(),
    );

    let envelope = pipeline
        .answer("total quantity invoiced per product")
        .await
        .unwrap();

    assert!(envelope.sql_query.contains("GROUP BY product_name"));
    assert!(envelope.sql_query.contains("SUM(invoiced_qty)"));
    assert!(!envelope.sql_query.contains("```"));

    let rows: Vec<Value> = envelope.result.into_iter().map(Value::Object).collect();
    assert_eq!(rows, vec![json!({"product_name": "A", "total": 5})]);

    assert_eq!(
        translator.last_user_message.lock().unwrap().as_deref(),
        Some("Convert this natural language query to an SQL query: total quantity invoiced per product")
    );
    assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_input_contacts_nothing() {
    let translator = FixedTranslator::new("SELECT 1");
    let executor = executor();
    let pipeline = Pipeline::new(
        schema(),
        translator.clone(),
        executor.clone(),
        PipelineOptions::default(),
    );

    let err = pipeline.answer("").await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));
    assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_drop_table_is_never_executed() {
    let translator = FixedTranslator::new("DROP TABLE erp.invoice;");
    let executor = executor();
    let pipeline = Pipeline::new(
        schema(),
        translator.clone(),
        executor.clone(),
        PipelineOptions::default(),
    );

    let err = pipeline.answer("remove the invoice table").await.unwrap_err();
    assert!(matches!(err, PipelineError::UnsafeStatement(_)));
    assert_eq!(executor.calls.load(Ordering::SeqCst), 0);

    // The table is still there.
    let check = FixedTranslator::new("SELECT COUNT(*) AS n FROM erp.invoice");
    let pipeline = Pipeline::new(schema(), check, executor.clone(), PipelineOptions::default());
    let envelope = pipeline.answer("how many invoice lines").await.unwrap();
    assert_eq!(envelope.result[0]["n"], json!(2));
}

#[tokio::test]
async fn test_zero_row_answer_is_success() {
    let translator =
        FixedTranslator::new("SELECT product_name FROM erp.invoice WHERE invoiced_qty > 10");
    let pipeline = Pipeline::new(schema(), translator, executor(), PipelineOptions::default());

    let envelope = pipeline.answer("products with more than ten units").await.unwrap();
    assert!(envelope.result.is_empty());
}

#[tokio::test]
async fn test_engine_rejection_surfaces_as_execution_error() {
    let translator = FixedTranslator::new("SELECT missing_column FROM erp.invoice");
    let pipeline = Pipeline::new(schema(), translator, executor(), PipelineOptions::default());

    let err = pipeline.answer("show the missing column").await.unwrap_err();
    assert_eq!(err.kind(), "execution_error");
    assert!(err.to_string().contains("missing_column"));
}

#[tokio::test]
async fn test_catalog_functions_are_never_executed() {
    let replies = [
        "WITH duckdb_tables AS (SELECT 1) SELECT * FROM duckdb_tables()",
        "SELECT * FROM erp.invoice, LATERAL duckdb_settings()",
    ];
    for reply in replies {
        let executor = executor();
        let pipeline = Pipeline::new(
            schema(),
            FixedTranslator::new(reply),
            executor.clone(),
            PipelineOptions::default(),
        );

        let err = pipeline.answer("list every table").await.unwrap_err();
        assert_eq!(err.kind(), "unsafe_statement", "reply {:?}", reply);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }
}
