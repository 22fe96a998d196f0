// HTTP surface of the judge worker: liveness, metrics, direct execution

use crate::engine::ProcessEngine;
use crate::metrics::Metrics;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use judge_common::types::ExecutionStatus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ProcessEngine>,
    pub metrics: Arc<Metrics>,
    pub worker_id: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(base))
        .route("/health", get(health_check))
        .route("/test", get(legacy_test))
        .route("/metrics", get(metrics))
        .route("/access_inventory/:item_type", get(access_inventory))
        .route("/run", post(run_code))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub code: String,
    pub language: String,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub output: String,
    pub status: ExecutionStatus,
    pub duration: f64,
}

/// GET / - Liveness with the worker's identity
async fn base(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "up",
        "worker": state.worker_id,
        "languages": state.engine.registry().list_languages(),
    }))
}

/// GET /health
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "success",
        "message": "judge worker is up and running",
    }))
}

/// GET /test - kept for probes configured against the old executor
async fn legacy_test() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Executor is running" }))
}

/// GET /metrics - Prometheus text exposition
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /access_inventory/:item_type
async fn access_inventory(
    State(state): State<Arc<AppState>>,
    Path(item_type): Path<String>,
) -> impl IntoResponse {
    state.metrics.inventory_accessed(&item_type);
    Json(serde_json::json!({ "message": format!("Accessed {}", item_type) }))
}

/// POST /run - Execute synchronously through the shared engine
async fn run_code(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Rejected /run request");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": "invalid JSON" })),
            )
                .into_response();
        }
    };

    let outcome = state.engine.execute(&request.code, &request.language).await;
    state
        .metrics
        .observe_execution(&request.language, outcome.duration_secs);

    info!(
        language = %request.language,
        status = %outcome.status,
        duration_secs = outcome.duration_secs,
        "Direct execution finished"
    );

    (
        StatusCode::OK,
        Json(RunResponse {
            output: outcome.output,
            status: outcome.status,
            duration: outcome.duration_secs,
        }),
    )
        .into_response()
}
