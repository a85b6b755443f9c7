use crate::config::types::QvdConfig;
use crate::destinations::point::{FieldValue, Point};
use crate::destinations::{BatchWriter, WriteError};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Stages rows bound for a QVD table as JSON Lines.
///
/// There is no QVD encoder for Rust; rows are appended to a per-day staging
/// file that a Qlik reload task folds into the actual QVD. Appends are not
/// deduplicated, so a flush retried by the buffer engine can stage a row
/// twice.
pub struct QvdStagingWriter {
    config: QvdConfig,
}

#[derive(Serialize)]
struct StagedRow<'a> {
    ts_ms: i64,
    table: &'a str,
    measurement: &'a str,
    tags: &'a BTreeMap<String, String>,
    fields: &'a BTreeMap<String, FieldValue>,
}

impl QvdStagingWriter {
    pub fn new(config: QvdConfig) -> Self {
        Self { config }
    }

    fn staging_path(&self) -> PathBuf {
        let file_name = format!(
            "{}-{}.jsonl",
            self.config.table_name,
            Utc::now().format("%Y%m%d")
        );
        self.config.directory.join(file_name)
    }
}

#[async_trait]
impl BatchWriter for QvdStagingWriter {
    fn destination_name(&self) -> &str {
        "qvd"
    }

    async fn write_batch(&self, points: &[Point]) -> Result<(), WriteError> {
        if points.is_empty() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.config.directory).await?;

        let fallback_ts = Utc::now().timestamp_millis();
        let mut body = String::new();
        for point in points {
            let row = StagedRow {
                ts_ms: point.timestamp_ms.unwrap_or(fallback_ts),
                table: &self.config.table_name,
                measurement: &point.measurement,
                tags: &point.tags,
                fields: &point.fields,
            };
            body.push_str(&serde_json::to_string(&row)?);
            body.push('\n');
        }

        let path = self.staging_path();
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(body.as_bytes()).await?;
        file.flush().await?;

        debug!(
            path = %path.display(),
            rows = points.len(),
            "Staged rows for QVD table"
        );
        Ok(())
    }
}
