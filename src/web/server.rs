use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::api::{health_check, ingest_audit_event, queue_metrics, AppState};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/audit/event", post(ingest_audit_event))
        .route("/metrics/queues", get(queue_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the audit ingestion API until the shutdown signal flips.
pub async fn run_server(
    listener: TcpListener,
    state: AppState,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let app = build_router(state);

    info!(addr = %listener.local_addr()?, "Audit server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|&stop| stop).await;
            info!("Audit server shutting down gracefully");
        })
        .await
}
