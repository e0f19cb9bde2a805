//! HTTP surface for the executor
//!
//! - `POST /code/exec`: run a snippet
//! - `GET /health`: liveness
//! - `GET /pool/stats`: pool snapshot

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::Error;
use crate::executor::{CodeExecutor, ExecuteRequest, ExecuteResponse};
use crate::pool::PoolStats;

// ---- App State ----

#[derive(Clone)]
pub struct AppState {
    executor: Arc<CodeExecutor>,
}

// ---- Error Handling ----

pub struct AppError(Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Interrupted(_) | Error::RuntimeUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            err if err.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

// ---- Handlers ----

async fn execute(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, AppError> {
    let response = state.executor.execute_request(&request).await?;
    Ok(Json(response))
}

async fn health() -> &'static str {
    "OK"
}

async fn pool_stats(State(state): State<AppState>) -> Json<PoolStats> {
    Json(state.executor.pool().stats())
}

// ---- Router ----

pub fn build_router(executor: Arc<CodeExecutor>) -> Router {
    let state = AppState { executor };

    Router::new()
        .route("/code/exec", post(execute))
        .route("/health", get(health))
        .route("/pool/stats", get(pool_stats))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
