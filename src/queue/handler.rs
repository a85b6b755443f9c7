use crate::config::types::UdpQueueSettings;
use crate::queue::metrics::{MetricsSnapshot, QueueMetrics};
use crate::queue::rate_limit::{LogThrottle, SlidingWindow};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// Width of the message-rate accounting window.
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Admission control and bounded concurrent execution for inbound
/// UDP-derived work items.
///
/// Each accepted message is handed to a caller-supplied async handler running
/// inside a worker pool of `max_concurrent` logical slots. `add_message`
/// returns as soon as the message is admitted: `true` means "accepted for
/// processing", never "processed". Queue-full always rejects the incoming
/// message; already-queued work is never evicted.
///
/// The handler is a cheap clonable handle; clones share one queue.
#[derive(Clone)]
pub struct UdpQueueHandler {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    name: String,
    settings: UdpQueueSettings,
    semaphore: Semaphore,
    /// Queued plus in-flight work items.
    pending: AtomicUsize,
    backpressure_active: AtomicBool,
    metrics: Mutex<QueueMetrics>,
    rate_window: Mutex<SlidingWindow>,
    rate_violation_log: Mutex<LogThrottle>,
    queue_full_log: Mutex<LogThrottle>,
}

impl UdpQueueHandler {
    pub fn new(name: impl Into<String>, settings: UdpQueueSettings) -> Self {
        let name = name.into();
        info!(
            queue = %name,
            max_concurrent = settings.max_concurrent,
            max_size = settings.max_size,
            rate_limit = settings.rate_limit.enable,
            max_messages_per_minute = settings.rate_limit.max_messages_per_minute,
            max_message_size_bytes = settings.max_message_size_bytes,
            backpressure_threshold_percent = settings.backpressure_threshold_percent,
            "UDP queue handler initialized"
        );

        Self {
            inner: Arc::new(QueueInner {
                semaphore: Semaphore::new(settings.max_concurrent),
                pending: AtomicUsize::new(0),
                backpressure_active: AtomicBool::new(false),
                metrics: Mutex::new(QueueMetrics::new()),
                rate_window: Mutex::new(SlidingWindow::new(
                    settings.rate_limit.max_messages_per_minute,
                    RATE_WINDOW,
                )),
                rate_violation_log: Mutex::new(LogThrottle::new(
                    settings.rate_limit.violation_log_throttle,
                )),
                queue_full_log: Mutex::new(LogThrottle::new(settings.queue_full_log_throttle)),
                name,
                settings,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Queued plus in-flight work items at this instant.
    pub fn queue_depth(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Admit one message and schedule its handler.
    ///
    /// Admission checks run in strict order, each rejection incrementing its
    /// own drop counter: size limit, rate limit, queue capacity. The handler
    /// is supplied per call so one queue can serve messages with different
    /// routing logic. Handler failures and timeouts are isolated per message
    /// and never reach the caller.
    pub fn add_message<F, Fut, E>(&self, message: Vec<u8>, remote: SocketAddr, handler: F) -> bool
    where
        F: FnOnce(Vec<u8>, SocketAddr) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let inner = &self.inner;
        let now = Instant::now();
        inner.metrics.lock().unwrap().messages_received += 1;

        if message.len() > inner.settings.max_message_size_bytes {
            inner.metrics.lock().unwrap().dropped_size += 1;
            warn!(
                queue = %inner.name,
                size = message.len(),
                limit = inner.settings.max_message_size_bytes,
                remote = %remote,
                "Dropping oversized message"
            );
            return false;
        }

        let admitted = inner
            .rate_window
            .lock()
            .unwrap()
            .try_admit(now, inner.settings.rate_limit.enable);
        if !admitted {
            inner.metrics.lock().unwrap().dropped_rate_limit += 1;
            if inner.rate_violation_log.lock().unwrap().should_log(now) {
                warn!(
                    queue = %inner.name,
                    max_messages_per_minute = inner.settings.rate_limit.max_messages_per_minute,
                    "Message rate limit exceeded, dropping messages"
                );
            }
            return false;
        }

        if inner.pending.load(Ordering::SeqCst) >= inner.settings.max_size {
            inner.metrics.lock().unwrap().dropped_queue_full += 1;
            if inner.queue_full_log.lock().unwrap().should_log(now) {
                warn!(
                    queue = %inner.name,
                    max_size = inner.settings.max_size,
                    "Queue full, rejecting incoming message"
                );
            }
            return false;
        }

        inner.metrics.lock().unwrap().messages_queued += 1;
        inner.pending.fetch_add(1, Ordering::SeqCst);
        inner.check_backpressure();

        let task_inner = Arc::clone(inner);
        tokio::spawn(async move {
            task_inner.run_handler(message, remote, handler).await;
            task_inner.pending.fetch_sub(1, Ordering::SeqCst);
            task_inner.check_backpressure();
        });

        true
    }

    pub fn backpressure_active(&self) -> bool {
        self.inner.backpressure_active.load(Ordering::SeqCst)
    }

    /// Point-in-time metrics snapshot. Does not mutate counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        let depth = inner.pending.load(Ordering::SeqCst);
        let rate = inner
            .rate_window
            .lock()
            .unwrap()
            .current_count(Instant::now());
        let backpressure = inner.backpressure_active.load(Ordering::SeqCst);
        inner
            .metrics
            .lock()
            .unwrap()
            .snapshot(depth, rate, backpressure)
    }

    /// Explicit counter reset.
    pub fn reset_metrics(&self) {
        self.inner.metrics.lock().unwrap().clear();
    }

    /// Wait until no work is queued or in flight. Shutdown/test helper, not
    /// part of the hot path.
    pub async fn wait_for_empty(&self) {
        while self.inner.pending.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl QueueInner {
    async fn run_handler<F, Fut, E>(&self, message: Vec<u8>, remote: SocketAddr, handler: F)
    where
        F: FnOnce(Vec<u8>, SocketAddr) -> Fut + Send,
        Fut: Future<Output = Result<(), E>> + Send,
        E: std::fmt::Display + Send,
    {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            // Closed only during teardown; the item is abandoned.
            Err(_) => return,
        };

        let started = Instant::now();
        match tokio::time::timeout(self.settings.handler_timeout, handler(message, remote)).await {
            Ok(Ok(())) => {
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                let mut metrics = self.metrics.lock().unwrap();
                metrics.messages_processed += 1;
                metrics.record_processing_time(elapsed_ms);
            }
            Ok(Err(e)) => {
                self.metrics.lock().unwrap().messages_failed += 1;
                error!(queue = %self.name, remote = %remote, error = %e, "Message handler failed");
            }
            Err(_) => {
                self.metrics.lock().unwrap().messages_failed += 1;
                error!(
                    queue = %self.name,
                    remote = %remote,
                    timeout_ms = self.settings.handler_timeout.as_millis(),
                    "Message handler timed out"
                );
            }
        }
    }

    /// Edge-triggered utilization check.
    ///
    /// Logs exactly once per threshold crossing in either direction; repeated
    /// checks while the state is unchanged stay silent.
    fn check_backpressure(&self) {
        let depth = self.pending.load(Ordering::SeqCst);
        let utilization = depth * 100 / self.settings.max_size;
        let above = utilization >= self.settings.backpressure_threshold_percent as usize;

        let was_above = self.backpressure_active.swap(above, Ordering::SeqCst);
        if above && !was_above {
            warn!(
                queue = %self.name,
                queue_depth = depth,
                utilization_percent = utilization,
                threshold_percent = self.settings.backpressure_threshold_percent,
                "Queue backpressure threshold reached"
            );
        } else if !above && was_above {
            info!(
                queue = %self.name,
                queue_depth = depth,
                "Queue backpressure cleared"
            );
        }
    }
}
