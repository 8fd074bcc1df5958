// Admin/health HTTP routes: metrics, audit trigger, audit status.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::audit::AuditReconciler;
use crate::metrics;

#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<AuditReconciler>,
}

pub fn router(reconciler: Arc<AuditReconciler>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .route("/api/audit/run", post(run_audit))
        .route("/api/audit/stop", post(stop_audit))
        .route("/api/audit/status", get(audit_status))
        .with_state(AppState { reconciler })
}

fn json_error(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(json!({ "error": msg })))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "gauntlet-backend" }))
}

async fn metrics_text() -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

/// On-demand audit trigger. The sweep runs in the background; poll
/// `/api/audit/status` for the result.
async fn run_audit(State(state): State<AppState>) -> impl IntoResponse {
    if state.reconciler.is_running() {
        return json_error(StatusCode::CONFLICT, "audit sweep already running").into_response();
    }
    let reconciler = state.reconciler.clone();
    tokio::spawn(async move {
        if let Err(e) = reconciler.run_sweep().await {
            tracing::error!(error = %e, "on-demand audit sweep failed to start");
        }
    });
    (StatusCode::ACCEPTED, Json(json!({ "started": true }))).into_response()
}

async fn stop_audit(State(state): State<AppState>) -> impl IntoResponse {
    if !state.reconciler.is_running() {
        return json_error(StatusCode::CONFLICT, "no audit sweep running").into_response();
    }
    state.reconciler.request_cancel();
    (StatusCode::ACCEPTED, Json(json!({ "stopping": true }))).into_response()
}

async fn audit_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "running": state.reconciler.is_running(),
        "last": state.reconciler.last_summary(),
    }))
}
