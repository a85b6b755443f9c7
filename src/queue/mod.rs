pub mod handler;
pub mod metrics;
pub mod rate_limit;

pub use handler::UdpQueueHandler;
pub use metrics::{MetricsSnapshot, QueueMetrics};
pub use rate_limit::{LogThrottle, SlidingWindow};
