use crate::config::types::ParquetConfig;
use crate::destinations::point::Point;
use crate::destinations::{BatchWriter, WriteError};
use async_trait::async_trait;
use chrono::Utc;
use parquet::basic::Compression;
use parquet::data_type::{ByteArray, ByteArrayType, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Fixed row layout: timestamp plus the point's parts, with tags and fields
/// carried as JSON strings so the schema is stable across event types.
const ROW_SCHEMA: &str = "
message audit_event {
    required int64 ts_ms;
    required binary measurement (UTF8);
    required binary tags (UTF8);
    required binary fields (UTF8);
}
";

/// Writes each flushed batch as its own parquet file.
///
/// Parquet files are not appendable, so a flush produces one timestamped
/// file in the configured directory. A flush retried by the buffer engine
/// writes a new file; duplicate rows across files are possible.
pub struct ParquetWriter {
    config: ParquetConfig,
}

impl ParquetWriter {
    pub fn new(config: ParquetConfig) -> Self {
        Self { config }
    }

    fn batch_path(&self) -> PathBuf {
        let file_name = format!(
            "{}-{}-{}.parquet",
            self.config.file_prefix,
            Utc::now().timestamp_millis(),
            Uuid::new_v4()
        );
        self.config.directory.join(file_name)
    }
}

#[async_trait]
impl BatchWriter for ParquetWriter {
    fn destination_name(&self) -> &str {
        "parquet"
    }

    async fn write_batch(&self, points: &[Point]) -> Result<(), WriteError> {
        if points.is_empty() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.config.directory).await?;
        let path = self.batch_path();
        let rows = points.to_vec();

        let encode_path = path.clone();
        tokio::task::spawn_blocking(move || encode_rows(&encode_path, &rows)).await??;

        debug!(
            path = %path.display(),
            rows = points.len(),
            "Wrote parquet batch"
        );
        Ok(())
    }
}

fn encode_rows(path: &Path, points: &[Point]) -> Result<(), WriteError> {
    let schema = Arc::new(parse_message_type(ROW_SCHEMA)?);
    let props = Arc::new(
        WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build(),
    );

    let fallback_ts = Utc::now().timestamp_millis();
    let timestamps: Vec<i64> = points
        .iter()
        .map(|p| p.timestamp_ms.unwrap_or(fallback_ts))
        .collect();
    let measurements: Vec<ByteArray> = points
        .iter()
        .map(|p| ByteArray::from(p.measurement.as_str()))
        .collect();
    let tags = json_column(points.iter().map(|p| &p.tags))?;
    let fields = json_column(points.iter().map(|p| &p.fields))?;

    let file = std::fs::File::create(path)?;
    let mut writer = SerializedFileWriter::new(file, schema, props)?;
    let mut row_group = writer.next_row_group()?;

    if let Some(mut column) = row_group.next_column()? {
        column.typed::<Int64Type>().write_batch(&timestamps, None, None)?;
        column.close()?;
    }
    for values in [&measurements, &tags, &fields] {
        if let Some(mut column) = row_group.next_column()? {
            column.typed::<ByteArrayType>().write_batch(values, None, None)?;
            column.close()?;
        }
    }

    row_group.close()?;
    writer.close()?;
    Ok(())
}

fn json_column<'a, T, I>(values: I) -> Result<Vec<ByteArray>, WriteError>
where
    T: serde::Serialize + 'a,
    I: Iterator<Item = &'a T>,
{
    values
        .map(|v| {
            let json = serde_json::to_string(v)?;
            Ok(ByteArray::from(json.into_bytes()))
        })
        .collect()
}
