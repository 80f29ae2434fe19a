//! Request handlers

use crate::error::ApiError;
use crate::server::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use drugrag_core::QueryOptions;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub max_subqueries: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub final_answer: String,
}

pub(crate) async fn query(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let text = request.query.unwrap_or_default();
    let query = state.pipeline.query(text)?;

    let options = QueryOptions {
        top_k: request.top_k,
        max_sub_questions: request.max_subqueries,
    };

    // Fires if the client goes away and this handler is dropped mid-query
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let outcome =
        match tokio::time::timeout(state.timeout, state.pipeline.execute(&query, options, &cancel))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                cancel.cancel();
                tracing::warn!(
                    "Query {} exceeded {}s deadline",
                    query.id(),
                    state.timeout.as_secs()
                );
                return Err(ApiError::Timeout {
                    secs: state.timeout.as_secs(),
                });
            }
        };
    guard.disarm();

    let answer = outcome.result?;
    Ok(Json(QueryResponse {
        query: query.text().to_string(),
        final_answer: answer.text,
    }))
}

pub(crate) async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readyz(State(state): State<AppState>) -> Json<Value> {
    let chunks = state.pipeline.index().len();
    Json(json!({ "ready": chunks > 0, "chunks": chunks }))
}
