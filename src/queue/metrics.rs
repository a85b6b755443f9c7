use serde::Serialize;
use std::collections::VecDeque;

/// Number of processing-time samples retained for percentile derivation.
const PROCESSING_TIME_SAMPLES: usize = 1000;

/// Mutable counters owned by exactly one queue handler.
///
/// Reset only through [`QueueMetrics::clear`]; every read goes through
/// [`QueueMetrics::snapshot`], which derives statistics without mutating
/// state.
#[derive(Default)]
pub struct QueueMetrics {
    pub messages_received: u64,
    pub messages_queued: u64,
    pub messages_processed: u64,
    pub messages_failed: u64,
    pub dropped_rate_limit: u64,
    pub dropped_queue_full: u64,
    pub dropped_size: u64,
    processing_times_ms: VecDeque<f64>,
    max_processing_time_ms: f64,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successful handler invocation's duration.
    ///
    /// Keeps a bounded ring of the most recent samples; the high-water mark
    /// never decreases except on [`clear`](Self::clear).
    pub fn record_processing_time(&mut self, elapsed_ms: f64) {
        if self.processing_times_ms.len() >= PROCESSING_TIME_SAMPLES {
            self.processing_times_ms.pop_front();
        }
        self.processing_times_ms.push_back(elapsed_ms);

        if elapsed_ms > self.max_processing_time_ms {
            self.max_processing_time_ms = elapsed_ms;
        }
    }

    /// Derive a point-in-time snapshot. Pure read.
    pub fn snapshot(
        &self,
        queue_depth: usize,
        messages_per_minute: usize,
        backpressure_active: bool,
    ) -> MetricsSnapshot {
        let (avg, p95) = derive_timing_stats(&self.processing_times_ms);

        MetricsSnapshot {
            messages_received: self.messages_received,
            messages_queued: self.messages_queued,
            messages_processed: self.messages_processed,
            messages_failed: self.messages_failed,
            dropped_rate_limit: self.dropped_rate_limit,
            dropped_queue_full: self.dropped_queue_full,
            dropped_size: self.dropped_size,
            queue_depth,
            messages_per_minute,
            backpressure_active,
            avg_processing_time_ms: avg,
            p95_processing_time_ms: p95,
            max_processing_time_ms: self.max_processing_time_ms,
        }
    }

    /// Explicit reset of all counters, samples, and the high-water mark.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

fn derive_timing_stats(samples: &VecDeque<f64>) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }

    let sum: f64 = samples.iter().sum();
    let avg = sum / samples.len() as f64;

    let mut sorted: Vec<f64> = samples.iter().copied().collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let idx = (0.95 * sorted.len() as f64).floor() as usize;
    let p95 = sorted[idx.min(sorted.len() - 1)];

    (avg, p95)
}

/// Serializable view of a queue's metrics at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub messages_queued: u64,
    pub messages_processed: u64,
    pub messages_failed: u64,
    pub dropped_rate_limit: u64,
    pub dropped_queue_full: u64,
    pub dropped_size: u64,
    pub queue_depth: usize,
    pub messages_per_minute: usize,
    pub backpressure_active: bool,
    pub avg_processing_time_ms: f64,
    pub p95_processing_time_ms: f64,
    pub max_processing_time_ms: f64,
}
