use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub udp: UdpConfig,
    pub audit: AuditConfig,
    #[serde(default)]
    pub destinations: DestinationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpConfig {
    pub user_events: UdpSocketConfig,
    pub log_events: UdpSocketConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpSocketConfig {
    pub listen: String,
    #[serde(default)]
    pub queue: UdpQueueSettings,
}

/// Admission and worker-pool settings for one UDP intake queue.
///
/// Queue-full always rejects the incoming message; accepted messages are
/// processed by a bounded pool of concurrent handler invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpQueueSettings {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_backpressure_threshold")]
    pub backpressure_threshold_percent: u8,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    /// Maximum accepted datagram size. Defaults to the UDP payload maximum.
    #[serde(default = "default_max_message_size")]
    pub max_message_size_bytes: usize,
    #[serde(default = "default_handler_timeout", with = "humantime_serde")]
    pub handler_timeout: Duration,
    #[serde(default = "default_queue_full_log_throttle", with = "humantime_serde")]
    pub queue_full_log_throttle: Duration,
}

impl Default for UdpQueueSettings {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_size: default_max_size(),
            backpressure_threshold_percent: default_backpressure_threshold(),
            rate_limit: RateLimitSettings::default(),
            max_message_size_bytes: default_max_message_size(),
            handler_timeout: default_handler_timeout(),
            queue_full_log_throttle: default_queue_full_log_throttle(),
        }
    }
}

fn default_max_concurrent() -> usize {
    4
}

fn default_max_size() -> usize {
    1000
}

fn default_backpressure_threshold() -> u8 {
    80
}

fn default_max_message_size() -> usize {
    65507
}

fn default_handler_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_queue_full_log_throttle() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_max_messages_per_minute")]
    pub max_messages_per_minute: usize,
    #[serde(default = "default_violation_log_throttle", with = "humantime_serde")]
    pub violation_log_throttle: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enable: false,
            max_messages_per_minute: default_max_messages_per_minute(),
            violation_log_throttle: default_violation_log_throttle(),
        }
    }
}

fn default_max_messages_per_minute() -> usize {
    600
}

fn default_violation_log_throttle() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub server: AuditServerConfig,
    #[serde(default)]
    pub queue: AuditQueueSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditServerConfig {
    pub listen: String,
}

/// Governance for HTTP-sourced audit events ahead of the destination buffers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditQueueSettings {
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
}

impl Default for AuditQueueSettings {
    fn default() -> Self {
        Self {
            max_pending: default_max_pending(),
            rate_limit: RateLimitSettings::default(),
        }
    }
}

fn default_max_pending() -> usize {
    5000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DestinationsConfig {
    pub influxdb: Option<InfluxConfig>,
    pub parquet: Option<ParquetConfig>,
    pub qvd: Option<QvdConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfluxVersion {
    V1,
    V2,
    V3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    #[serde(default)]
    pub enable: bool,
    pub version: InfluxVersion,
    pub url: String,
    /// Target database (v1 and v3).
    pub database: Option<String>,
    /// Organization and bucket (v2).
    pub org: Option<String>,
    pub bucket: Option<String>,
    /// API token (v2 and v3).
    pub token: Option<String>,
    /// Basic-auth credentials (v1).
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_write_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_retry_interval", with = "humantime_serde")]
    pub retry_interval: Duration,
    #[serde(default)]
    pub buffering: BufferingSettings,
}

fn default_write_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_interval() -> Duration {
    Duration::from_secs(5)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetConfig {
    #[serde(default)]
    pub enable: bool,
    pub directory: PathBuf,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(default)]
    pub buffering: BufferingSettings,
}

fn default_file_prefix() -> String {
    "audit-events".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QvdConfig {
    #[serde(default)]
    pub enable: bool,
    pub directory: PathBuf,
    #[serde(default = "default_table_name")]
    pub table_name: String,
    #[serde(default)]
    pub buffering: BufferingSettings,
}

fn default_table_name() -> String {
    "AuditEvents".to_string()
}

/// Buffer-and-flush behavior shared by every destination.
///
/// A zero `write_frequency` disables interval flushing and degenerates to a
/// flush request per buffered event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferingSettings {
    #[serde(default = "default_write_frequency", with = "humantime_serde")]
    pub write_frequency: Duration,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for BufferingSettings {
    fn default() -> Self {
        Self {
            write_frequency: default_write_frequency(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

fn default_write_frequency() -> Duration {
    Duration::from_secs(20)
}

fn default_max_batch_size() -> usize {
    1000
}
