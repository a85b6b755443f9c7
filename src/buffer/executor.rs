use futures::future::BoxFuture;

/// Strategy for running a buffer's flush job.
///
/// Injected into [`EventBuffer`](crate::buffer::EventBuffer) so flushes can
/// be routed through the audit queue manager's governed work queue instead of
/// reaching into shared global state. [`DirectExecutor`] is the fallback
/// direct-execution path.
pub trait FlushExecutor: Send + Sync {
    fn spawn_flush(&self, job: BoxFuture<'static, ()>);
}

/// Runs flush jobs straight on the runtime.
pub struct DirectExecutor;

impl FlushExecutor for DirectExecutor {
    fn spawn_flush(&self, job: BoxFuture<'static, ()>) {
        tokio::spawn(job);
    }
}
