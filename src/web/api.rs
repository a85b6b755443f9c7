use crate::audit::envelope::{AuditEvent, SUPPORTED_SCHEMA_VERSION};
use crate::audit::queue_manager::AuditQueueManager;
use crate::queue::UdpQueueHandler;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub queue_manager: Arc<AuditQueueManager>,
    pub user_queue: UdpQueueHandler,
    pub log_queue: UdpQueueHandler,
}

pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Accept one audit event.
///
/// Returns 202 whenever the envelope is valid, independent of whether the
/// event survives rate limiting, queuing, or the destination writes; UDP-style
/// fire-and-forget semantics apply on the HTTP path too.
pub async fn ingest_audit_event(
    State(state): State<AppState>,
    Json(event): Json<AuditEvent>,
) -> impl IntoResponse {
    if event.schema_version != SUPPORTED_SCHEMA_VERSION {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "unsupported schema version",
                "supported": SUPPORTED_SCHEMA_VERSION,
            })),
        );
    }

    state.queue_manager.add_to_queue(event);
    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" })))
}

/// Live metrics for both UDP intake queues and the audit event queue.
pub async fn queue_metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "user_events": state.user_queue.metrics(),
        "log_events": state.log_queue.metrics(),
        "audit_queue": state.queue_manager.stats(),
    }))
}
