use crate::audit::envelope::AuditEvent;
use crate::buffer::FlushExecutor;
use crate::config::types::AuditQueueSettings;
use crate::destinations::DestinationRouter;
use crate::queue::rate_limit::{LogThrottle, SlidingWindow};
use futures::future::BoxFuture;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Width of the audit-event rate accounting window.
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Throttle for queue-full warnings.
const QUEUE_FULL_LOG_THROTTLE: Duration = Duration::from_secs(10);

enum AuditCommand {
    Ingest(Box<AuditEvent>),
    Flush(BoxFuture<'static, ()>),
}

/// Rate-limits and queues inbound HTTP audit events ahead of the
/// per-destination buffers.
///
/// Also serves as the buffers' [`FlushExecutor`], so flush jobs run on the
/// same governed work queue instead of the buffers reaching back into shared
/// state; when the queue is saturated the flush falls back to direct
/// execution.
pub struct AuditQueueManager {
    tx: mpsc::Sender<AuditCommand>,
    settings: AuditQueueSettings,
    router: Arc<OnceLock<Arc<DestinationRouter>>>,
    rate_window: Mutex<SlidingWindow>,
    violation_log: Mutex<LogThrottle>,
    queue_full_log: Mutex<LogThrottle>,
    events_accepted: AtomicU64,
    events_dropped_rate_limit: AtomicU64,
    events_dropped_queue_full: AtomicU64,
}

impl AuditQueueManager {
    pub fn new(settings: AuditQueueSettings) -> Arc<Self> {
        let (tx, mut rx) = mpsc::channel::<AuditCommand>(settings.max_pending);
        let router: Arc<OnceLock<Arc<DestinationRouter>>> = Arc::new(OnceLock::new());

        let worker_router = Arc::clone(&router);
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    AuditCommand::Ingest(event) => match worker_router.get() {
                        Some(router) => router.write_event(&event),
                        None => {
                            warn!(event_id = %event.event_id, "No destination router attached, dropping audit event")
                        }
                    },
                    AuditCommand::Flush(job) => job.await,
                }
            }
            debug!("Audit queue worker stopped");
        });

        info!(
            max_pending = settings.max_pending,
            rate_limit = settings.rate_limit.enable,
            max_events_per_minute = settings.rate_limit.max_messages_per_minute,
            "Audit event queue manager started"
        );

        Arc::new(Self {
            tx,
            rate_window: Mutex::new(SlidingWindow::new(
                settings.rate_limit.max_messages_per_minute,
                RATE_WINDOW,
            )),
            violation_log: Mutex::new(LogThrottle::new(settings.rate_limit.violation_log_throttle)),
            queue_full_log: Mutex::new(LogThrottle::new(QUEUE_FULL_LOG_THROTTLE)),
            events_accepted: AtomicU64::new(0),
            events_dropped_rate_limit: AtomicU64::new(0),
            events_dropped_queue_full: AtomicU64::new(0),
            settings,
            router,
        })
    }

    /// Attach the router the worker drains into. Set once during startup;
    /// the manager and router reference each other, so construction happens
    /// in two steps.
    pub fn attach_router(&self, router: Arc<DestinationRouter>) {
        let _ = self.router.set(router);
    }

    /// Queue one audit event. Returns false when the event was dropped by
    /// rate limiting or a full queue; the HTTP layer acknowledges either
    /// way.
    pub fn add_to_queue(&self, event: AuditEvent) -> bool {
        let now = Instant::now();

        let admitted = self
            .rate_window
            .lock()
            .unwrap()
            .try_admit(now, self.settings.rate_limit.enable);
        if !admitted {
            self.events_dropped_rate_limit.fetch_add(1, Ordering::Relaxed);
            if self.violation_log.lock().unwrap().should_log(now) {
                warn!(
                    max_events_per_minute = self.settings.rate_limit.max_messages_per_minute,
                    "Audit event rate limit exceeded, dropping events"
                );
            }
            return false;
        }

        match self.tx.try_send(AuditCommand::Ingest(Box::new(event))) {
            Ok(()) => {
                self.events_accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.events_dropped_queue_full.fetch_add(1, Ordering::Relaxed);
                if self.queue_full_log.lock().unwrap().should_log(now) {
                    warn!(
                        max_pending = self.settings.max_pending,
                        "Audit event queue full, dropping events"
                    );
                }
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Audit queue worker is gone, dropping event");
                false
            }
        }
    }

    pub fn stats(&self) -> AuditQueueStats {
        AuditQueueStats {
            events_accepted: self.events_accepted.load(Ordering::Relaxed),
            events_dropped_rate_limit: self.events_dropped_rate_limit.load(Ordering::Relaxed),
            events_dropped_queue_full: self.events_dropped_queue_full.load(Ordering::Relaxed),
            pending: self.settings.max_pending - self.tx.capacity(),
            max_pending: self.settings.max_pending,
        }
    }

    /// Wait until the queued commands have been drained. Shutdown helper.
    pub async fn drain(&self) {
        while self.settings.max_pending - self.tx.capacity() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl FlushExecutor for AuditQueueManager {
    fn spawn_flush(&self, job: BoxFuture<'static, ()>) {
        match self.tx.try_send(AuditCommand::Flush(job)) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) | Err(TrySendError::Closed(command)) => {
                // Saturated or stopped queue must not stall flushes.
                if let AuditCommand::Flush(job) = command {
                    tokio::spawn(job);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditQueueStats {
    pub events_accepted: u64,
    pub events_dropped_rate_limit: u64,
    pub events_dropped_queue_full: u64,
    pub pending: usize,
    pub max_pending: usize,
}
