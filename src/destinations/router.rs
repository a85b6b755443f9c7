use crate::audit::envelope::AuditEvent;
use crate::buffer::{BufferSettings, EventBuffer, FlushExecutor};
use crate::config::types::{DestinationsConfig, InfluxConfig, ParquetConfig, QvdConfig};
use crate::destinations::influx::InfluxWriter;
use crate::destinations::parquet::ParquetWriter;
use crate::destinations::point::Point;
use crate::destinations::qvd::QvdStagingWriter;
use crate::destinations::{BatchWriter, WriteError};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{error, info};

/// Fingerprint of a destination's connection settings.
///
/// Buffered records carry the fingerprint they were enqueued under; a change
/// means the buffer would mix two destination configurations and is
/// discarded instead.
pub fn config_fingerprint<T: Serialize>(identity: &T) -> Result<String, serde_json::Error> {
    let serialized = serde_json::to_string(identity)?;
    let digest = Sha256::digest(serialized.as_bytes());
    Ok(hex::encode(digest))
}

struct Destination {
    name: &'static str,
    buffer: EventBuffer,
    settings: BufferSettings,
    config_key: String,
}

/// Fans destination-ready points out to every enabled destination's buffer.
///
/// Constructed once at startup; each destination owns its buffer, its
/// current buffering settings, and its configuration fingerprint.
pub struct DestinationRouter {
    destinations: Vec<Destination>,
}

impl DestinationRouter {
    pub fn from_config(
        config: &DestinationsConfig,
        executor: Arc<dyn FlushExecutor>,
    ) -> Result<Self, WriteError> {
        let mut destinations = Vec::new();

        if let Some(influx) = &config.influxdb {
            if influx.enable {
                let writer = Arc::new(InfluxWriter::new(influx.clone())?);
                destinations.push(make_destination(
                    "influxdb",
                    writer,
                    &influx.buffering,
                    influx_identity(influx),
                    Arc::clone(&executor),
                )?);
            }
        }

        if let Some(parquet) = &config.parquet {
            if parquet.enable {
                let writer = Arc::new(ParquetWriter::new(parquet.clone()));
                destinations.push(make_destination(
                    "parquet",
                    writer,
                    &parquet.buffering,
                    parquet_identity(parquet),
                    Arc::clone(&executor),
                )?);
            }
        }

        if let Some(qvd) = &config.qvd {
            if qvd.enable {
                let writer = Arc::new(QvdStagingWriter::new(qvd.clone()));
                destinations.push(make_destination(
                    "qvd",
                    writer,
                    &qvd.buffering,
                    qvd_identity(qvd),
                    Arc::clone(&executor),
                )?);
            }
        }

        for destination in &destinations {
            info!(destination = destination.name, "Destination enabled");
        }

        Ok(Self { destinations })
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    /// Enqueue one point into every destination's buffer.
    pub fn write_point(&self, point: &Point) {
        for destination in &self.destinations {
            destination.buffer.buffer_event(
                point.clone(),
                &destination.settings,
                &destination.config_key,
            );
        }
    }

    /// Map an audit event once and enqueue the resulting point everywhere.
    pub fn write_event(&self, event: &AuditEvent) {
        let point = event.to_point();
        self.write_point(&point);
    }

    /// Drain every buffer; used on shutdown.
    pub async fn flush_all(&self) {
        for destination in &self.destinations {
            match destination.buffer.flush_now().await {
                Ok(0) => {}
                Ok(count) => {
                    info!(destination = destination.name, count, "Final flush complete")
                }
                Err(e) => {
                    error!(destination = destination.name, error = %e, "Final flush failed")
                }
            }
        }
    }
}

fn make_destination(
    name: &'static str,
    writer: Arc<dyn BatchWriter>,
    buffering: &crate::config::types::BufferingSettings,
    identity: Result<String, serde_json::Error>,
    executor: Arc<dyn FlushExecutor>,
) -> Result<Destination, WriteError> {
    Ok(Destination {
        name,
        buffer: EventBuffer::new(name, writer, executor),
        settings: BufferSettings {
            enable: true,
            write_frequency: buffering.write_frequency,
            max_batch_size: buffering.max_batch_size,
        },
        config_key: identity?,
    })
}

fn influx_identity(config: &InfluxConfig) -> Result<String, serde_json::Error> {
    config_fingerprint(&(
        &config.version,
        &config.url,
        &config.database,
        &config.org,
        &config.bucket,
        &config.token,
        &config.username,
    ))
}

fn parquet_identity(config: &ParquetConfig) -> Result<String, serde_json::Error> {
    config_fingerprint(&(&config.directory, &config.file_prefix))
}

fn qvd_identity(config: &QvdConfig) -> Result<String, serde_json::Error> {
    config_fingerprint(&(&config.directory, &config.table_name))
}
