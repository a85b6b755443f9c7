pub mod influx;
pub mod parquet;
pub mod point;
pub mod qvd;
pub mod router;

pub use influx::InfluxWriter;
pub use parquet::ParquetWriter;
pub use point::{FieldValue, Point};
pub use qvd::QvdStagingWriter;
pub use router::{config_fingerprint, DestinationRouter};

use async_trait::async_trait;
use thiserror::Error;

/// One write call against a destination.
///
/// Implementations own their transient-error retry; a returned error means
/// those retries are exhausted and the flush engine should step down its
/// batch-size ladder.
#[async_trait]
pub trait BatchWriter: Send + Sync {
    fn destination_name(&self) -> &str;

    async fn write_batch(&self, points: &[point::Point]) -> Result<(), WriteError>;
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("destination returned status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("parquet encoding failed: {0}")]
    Parquet(#[from] ::parquet::errors::ParquetError),

    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("write task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("destination misconfigured: {0}")]
    Config(String),

    #[error("max retries exceeded")]
    MaxRetriesExceeded,
}
