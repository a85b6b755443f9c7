use crate::audit::queue_manager::AuditQueueManager;
use crate::config::parse::load_config;
use crate::destinations::{DestinationRouter, WriteError};
use crate::queue::UdpQueueHandler;
use crate::udp::{run_listener, EventDispatch, ListenerKind};
use crate::web::{run_server, AppState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::parse::ConfigError),

    #[error("destination error: {0}")]
    Destination(#[from] WriteError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match config_path {
        Some(path) => path,
        None => {
            eprintln!("Error: config not found");
            eprintln!("Searched locations:");
            eprintln!("  ~/.config/sensebridge/config.yml");
            eprintln!("  /etc/sensebridge/config.yml");
            eprintln!("\nUse --config <path> to specify a config file, or run 'sensebridge config init' to generate one.");
            std::process::exit(1);
        }
    };

    run_agent(&config_path).await.map_err(|e| e.into())
}

async fn run_agent(config_path: &Path) -> Result<(), RunError> {
    let agent_id = hostname::get()
        .ok()
        .and_then(|h| h.to_str().map(|s| s.to_string()))
        .unwrap_or_else(|| "sensebridge".to_string());
    info!(
        agent_id = %agent_id,
        version = env!("CARGO_PKG_VERSION"),
        config_path = %config_path.display(),
        "Loading configuration"
    );
    let config = load_config(config_path)?;

    // The queue manager and the router reference each other: the router's
    // buffers schedule flushes through the manager, the manager's worker
    // drains events into the router. Construction happens in two steps.
    let queue_manager = AuditQueueManager::new(config.audit.queue.clone());
    let router = Arc::new(DestinationRouter::from_config(
        &config.destinations,
        queue_manager.clone(),
    )?);
    queue_manager.attach_router(Arc::clone(&router));

    if router.is_empty() {
        warn!("No destinations enabled, received events will be parsed and dropped");
    }

    let dispatch = Arc::new(EventDispatch::new(Arc::clone(&router)));
    let user_queue = UdpQueueHandler::new(
        "user_events",
        config.udp.user_events.queue.clone(),
    );
    let log_queue = UdpQueueHandler::new(
        "log_events",
        config.udp.log_events.queue.clone(),
    );

    let cancel = CancellationToken::new();

    info!("Starting UDP listeners");
    let user_listener = tokio::spawn(run_listener(
        ListenerKind::UserEvents,
        config.udp.user_events.listen.clone(),
        user_queue.clone(),
        Arc::clone(&dispatch),
        cancel.child_token(),
    ));
    let log_listener = tokio::spawn(run_listener(
        ListenerKind::LogEvents,
        config.udp.log_events.listen.clone(),
        log_queue.clone(),
        Arc::clone(&dispatch),
        cancel.child_token(),
    ));

    info!(addr = %config.audit.server.listen, "Starting audit server");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener = tokio::net::TcpListener::bind(&config.audit.server.listen).await?;
    let state = AppState {
        queue_manager: Arc::clone(&queue_manager),
        user_queue: user_queue.clone(),
        log_queue: log_queue.clone(),
    };
    let server = tokio::spawn(run_server(listener, state, shutdown_rx));

    info!("Agent started, press Ctrl+C to shutdown");
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }

    // Stop the intake first, then drain what is already in flight.
    cancel.cancel();
    let _ = shutdown_tx.send(true);

    info!("Draining queues");
    user_queue.wait_for_empty().await;
    log_queue.wait_for_empty().await;
    queue_manager.drain().await;

    info!("Flushing destination buffers");
    router.flush_all().await;

    await_task(user_listener, "User event listener").await;
    await_task(log_listener, "Log event listener").await;
    await_task(server, "Audit server").await;

    info!("Agent shutdown complete");
    Ok(())
}

async fn await_task(handle: JoinHandle<Result<(), std::io::Error>>, name: &str) {
    match handle.await {
        Ok(Ok(())) => info!("{name} stopped"),
        Ok(Err(e)) => error!(error = %e, "{name} error"),
        Err(e) => error!(error = %e, "{name} task join error"),
    }
}
