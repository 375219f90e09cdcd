//! HTTP surface over the pipeline
//!
//! - `POST /query`  natural language in, generated SQL and rows out
//! - `GET /schema`  the active schema descriptor and its fingerprint
//! - `GET /health`  liveness

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use nl2sql_core::{Pipeline, PipelineError, ResponseEnvelope};
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::log_event;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub expose_error_detail: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub user_input: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/query", post(handle_query))
        .route("/schema", get(get_schema))
        .route("/health", get(health_check))
        .with_state(state)
}

pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("nl2sql server listening on {}", addr);
    axum::serve(listener, router(state)).await
}

pub async fn handle_query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<ResponseEnvelope>, (StatusCode, Json<ErrorResponse>)> {
    let outcome = match payload {
        Ok(Json(req)) => {
            state
                .pipeline
                .answer(req.user_input.as_deref().unwrap_or_default())
                .await
        }
        Err(rejection) => Err(PipelineError::InvalidInput(format!(
            "No user input provided: {}",
            rejection.body_text()
        ))),
    };

    match outcome {
        Ok(envelope) => {
            log_event!(
                level: Level::INFO,
                event: "query_answered",
                status: 200,
                rows: envelope.result.len()
            );
            Ok(Json(envelope))
        }
        Err(e) => {
            let (status, body) = error_response(&e, state.expose_error_detail);
            log_event!(
                level: Level::WARN,
                event: "query_failed",
                status: status.as_u16(),
                kind: body.kind
            );
            Err((status, Json(body)))
        }
    }
}

/// Map a pipeline failure to a status code and payload
pub fn error_response(err: &PipelineError, expose_detail: bool) -> (StatusCode, ErrorResponse) {
    let status = if err.is_caller_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    let error = match err {
        PipelineError::UnsafeStatement(_) if !expose_detail => {
            "The generated query was rejected by the safety policy".to_string()
        }
        PipelineError::ExecutionError(_) if !expose_detail => {
            "The database rejected the generated query".to_string()
        }
        other => other.to_string(),
    };

    (
        status,
        ErrorResponse {
            error,
            kind: err.kind().to_string(),
        },
    )
}

pub async fn get_schema(State(state): State<AppState>) -> Json<serde_json::Value> {
    let schema = state.pipeline.schema();
    Json(serde_json::json!({
        "fingerprint": schema.fingerprint(),
        "schema": &*schema,
    }))
}

pub async fn health_check() -> &'static str {
    "OK"
}
