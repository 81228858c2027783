// src/handlers/workflows.rs
//! Workflow control endpoints - trigger, status, list, cancel, event history

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;

#[derive(Deserialize)]
pub struct TriggerRequest {
    pub topic: String,
    #[serde(default = "default_workflow_type")]
    pub workflow_type: String,
    #[serde(default)]
    pub platforms: Vec<String>,
    pub style: Option<String>,
}

fn default_workflow_type() -> String {
    "full_pipeline".to_string()
}

#[derive(Serialize)]
pub struct TriggerResponse {
    pub workflow_id: String,
    pub message: String,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// POST /api/workflows - Create and start a workflow in the background
pub async fn trigger_workflow(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<TriggerRequest>,
) -> impl IntoResponse {
    match state
        .manager
        .trigger(
            &request.topic,
            &request.workflow_type,
            request.platforms,
            request.style,
        )
        .await
    {
        Ok(workflow_id) => {
            let response = TriggerResponse {
                message: format!("Workflow {} started", workflow_id),
                workflow_id,
            };
            (StatusCode::ACCEPTED, Json(response)).into_response()
        }
        Err(e) => {
            tracing::warn!("Workflow trigger rejected: {}", e);
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

/// GET /api/workflows - List active and recently completed workflows
pub async fn list_workflows(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    Json(state.manager.list().await)
}

/// GET /api/workflows/:workflow_id/status - Point-in-time status snapshot
pub async fn get_workflow_status(
    Path(workflow_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    match state.manager.status_of(&workflow_id).await {
        Some(status) => (StatusCode::OK, Json(status)).into_response(),
        None => (StatusCode::NOT_FOUND, "Workflow not found").into_response(),
    }
}

/// GET /api/workflows/:workflow_id/events - Buffered progress event history
pub async fn get_workflow_events(
    Path(workflow_id): Path<String>,
    Query(query): Query<HistoryQuery>,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(50);
    Json(state.bus.history_of(&workflow_id, limit).await)
}

/// POST /api/workflows/:workflow_id/cancel - Request cooperative cancellation
pub async fn cancel_workflow(
    Path(workflow_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    let cancelled = state.manager.cancel(&workflow_id).await;
    if cancelled {
        tracing::info!("Cancelled workflow {}", workflow_id);
    }
    Json(serde_json::json!({
        "workflow_id": workflow_id,
        "cancelled": cancelled,
    }))
}

pub fn workflow_routes() -> Router {
    Router::new()
        .route("/api/workflows", get(list_workflows).post(trigger_workflow))
        .route("/api/workflows/:workflow_id/status", get(get_workflow_status))
        .route("/api/workflows/:workflow_id/events", get(get_workflow_events))
        .route("/api/workflows/:workflow_id/cancel", post(cancel_workflow))
}
