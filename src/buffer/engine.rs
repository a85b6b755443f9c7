use crate::buffer::executor::FlushExecutor;
use crate::destinations::point::Point;
use crate::destinations::{BatchWriter, WriteError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Fallback chunk sizes tried after the configured batch size fails.
const BATCH_SIZE_STEPS: [usize; 5] = [500, 250, 100, 10, 1];

/// Descending ladder of chunk sizes for one flush attempt: the configured
/// maximum first, then each smaller step.
pub(crate) fn batch_size_ladder(max_batch_size: usize) -> Vec<usize> {
    let max = max_batch_size.max(1);
    let mut ladder = vec![max];
    ladder.extend(BATCH_SIZE_STEPS.iter().copied().filter(|&step| step < max));
    ladder
}

/// Buffering behavior for one destination, as currently configured.
#[derive(Debug, Clone)]
pub struct BufferSettings {
    pub enable: bool,
    /// Interval between timer-triggered flushes; zero means a flush request
    /// per buffered event.
    pub write_frequency: Duration,
    pub max_batch_size: usize,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            enable: true,
            write_frequency: Duration::from_secs(20),
            max_batch_size: 1000,
        }
    }
}

#[derive(Debug, Error)]
pub enum FlushError {
    #[error("all batch sizes exhausted, {requeued} records returned to the buffer: {source}")]
    Exhausted {
        requeued: usize,
        #[source]
        source: WriteError,
    },
}

struct BufferState {
    records: Vec<Point>,
    config_key: Option<String>,
    settings: BufferSettings,
    timer: Option<JoinHandle<()>>,
}

struct BufferInner {
    name: String,
    writer: Arc<dyn BatchWriter>,
    executor: Arc<dyn FlushExecutor>,
    state: Mutex<BufferState>,
    flush_in_flight: AtomicBool,
}

/// Per-destination buffer with timer/threshold flush and progressive-batch
/// retry.
///
/// Records are mapped to their destination-ready form exactly once, at
/// enqueue. A flush detaches the whole buffer atomically and writes it in
/// chunks, stepping down the batch-size ladder on failure; if even size 1
/// fails, the entire detached set is prepended back for the next trigger.
/// Delivery is at-least-once: a set that partially succeeded at a failing
/// batch size is rewritten in full at the next size.
///
/// The buffer is a cheap clonable handle; clones share one buffer.
#[derive(Clone)]
pub struct EventBuffer {
    inner: Arc<BufferInner>,
}

impl EventBuffer {
    pub fn new(
        name: impl Into<String>,
        writer: Arc<dyn BatchWriter>,
        executor: Arc<dyn FlushExecutor>,
    ) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                name: name.into(),
                writer,
                executor,
                state: Mutex::new(BufferState {
                    records: Vec::new(),
                    config_key: None,
                    settings: BufferSettings::default(),
                    timer: None,
                }),
                flush_in_flight: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of records currently buffered.
    pub fn len(&self) -> usize {
        self.inner.state.lock().unwrap().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue one destination-ready record under the destination's current
    /// configuration.
    ///
    /// `config_key` fingerprints the destination's connection settings; when
    /// it differs from the key the buffer was filled under, the buffered
    /// records are discarded rather than written to the wrong destination.
    pub fn buffer_event(&self, point: Point, settings: &BufferSettings, config_key: &str) {
        let inner = &self.inner;
        let flush_reason = {
            let mut state = inner.state.lock().unwrap();
            state.settings = settings.clone();

            if !settings.enable {
                if !state.records.is_empty() {
                    warn!(
                        destination = %inner.name,
                        discarded = state.records.len(),
                        "Buffering disabled, discarding buffered records"
                    );
                }
                state.records.clear();
                if let Some(timer) = state.timer.take() {
                    timer.abort();
                }
                state.config_key = None;
                return;
            }

            if let Some(previous) = &state.config_key {
                if previous != config_key {
                    warn!(
                        destination = %inner.name,
                        discarded = state.records.len(),
                        "Destination configuration changed, discarding buffered records"
                    );
                    state.records.clear();
                    if let Some(timer) = state.timer.take() {
                        timer.abort();
                    }
                }
            }
            state.config_key = Some(config_key.to_string());

            if settings.write_frequency > Duration::ZERO && state.timer.is_none() {
                state.timer = Some(spawn_timer(
                    Arc::downgrade(inner),
                    settings.write_frequency,
                ));
            }

            state.records.push(point);

            if state.records.len() >= settings.max_batch_size {
                Some("batch size reached")
            } else if settings.write_frequency == Duration::ZERO {
                Some("immediate write")
            } else {
                None
            }
        };

        if let Some(reason) = flush_reason {
            self.request_flush(reason);
        }
    }

    /// Request an asynchronous flush. Requests are coalesced: while a flush
    /// is running, further requests are no-ops and newly buffered records
    /// wait for the next trigger.
    pub fn request_flush(&self, reason: &'static str) {
        BufferInner::request_flush(&self.inner, reason);
    }

    /// Flush inline and return the number of records written. Returns zero
    /// without writing when another flush is already running.
    pub async fn flush_now(&self) -> Result<usize, FlushError> {
        let inner = &self.inner;
        if inner
            .flush_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(0);
        }

        let result = inner.flush_detached().await;
        inner.flush_in_flight.store(false, Ordering::SeqCst);
        result
    }
}

/// Interval-flush task. Holds only a weak reference so dropping the last
/// buffer handle stops the timer.
fn spawn_timer(buffer: Weak<BufferInner>, frequency: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(frequency);
        // The first tick fires immediately; skip it.
        interval.tick().await;
        loop {
            interval.tick().await;
            match buffer.upgrade() {
                Some(inner) => BufferInner::request_flush(&inner, "interval"),
                None => break,
            }
        }
    })
}

impl BufferInner {
    fn request_flush(this: &Arc<Self>, reason: &'static str) {
        if this
            .flush_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(destination = %this.name, reason, "Flush already in progress, skipping request");
            return;
        }

        debug!(destination = %this.name, reason, "Flush requested");
        let task = Arc::clone(this);
        this.executor.spawn_flush(Box::pin(async move {
            if let Err(e) = task.flush_detached().await {
                error!(destination = %task.name, error = %e, "Flush failed");
            }
            task.flush_in_flight.store(false, Ordering::SeqCst);
        }));
    }

    async fn flush_detached(&self) -> Result<usize, FlushError> {
        let (detached, max_batch_size) = {
            let mut state = self.state.lock().unwrap();
            let max_batch_size = state.settings.max_batch_size;
            (std::mem::take(&mut state.records), max_batch_size)
        };

        if detached.is_empty() {
            return Ok(0);
        }

        let mut last_error = None;
        for batch_size in batch_size_ladder(max_batch_size) {
            match self.write_chunks(&detached, batch_size).await {
                Ok(()) => {
                    info!(
                        destination = %self.name,
                        count = detached.len(),
                        batch_size,
                        "Flushed buffered records"
                    );
                    return Ok(detached.len());
                }
                Err(e) => {
                    warn!(
                        destination = %self.name,
                        batch_size,
                        error = %e,
                        "Batch write failed, retrying with smaller batches"
                    );
                    last_error = Some(e);
                }
            }
        }

        // Ladder exhausted: restore the whole detached set ahead of anything
        // buffered while the flush was running.
        let requeued = detached.len();
        {
            let mut state = self.state.lock().unwrap();
            let mut restored = detached;
            restored.append(&mut state.records);
            state.records = restored;
        }

        match last_error {
            Some(source) => Err(FlushError::Exhausted { requeued, source }),
            None => Ok(0),
        }
    }

    async fn write_chunks(&self, records: &[Point], batch_size: usize) -> Result<(), WriteError> {
        for chunk in records.chunks(batch_size.max(1)) {
            self.writer.write_batch(chunk).await?;
        }
        Ok(())
    }
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        if let Ok(state) = self.state.get_mut() {
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
        }
    }
}
