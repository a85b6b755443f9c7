use crate::destinations::point::Point;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Envelope schema version this agent accepts.
pub const SUPPORTED_SCHEMA_VERSION: u32 = 1;

/// Audit event envelope as received on the HTTP ingestion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub schema_version: u32,
    pub event_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub payload: Value,
}

impl AuditEvent {
    /// Map the envelope into its destination-ready point.
    ///
    /// Top-level scalar payload entries become fields; nested values are
    /// carried as their JSON text. This mapping runs exactly once per event,
    /// at enqueue time.
    pub fn to_point(&self) -> Point {
        let mut point = Point::new("audit_event")
            .with_timestamp_ms(self.timestamp.timestamp_millis())
            .tag("event_type", &self.event_type)
            .field("event_id", self.event_id.to_string());

        if let Some(source) = &self.source {
            point = point.tag("source", source);
        }
        if let Some(correlation_id) = &self.correlation_id {
            point = point.field("correlation_id", correlation_id.clone());
        }

        match &self.payload {
            Value::Object(map) => {
                for (key, value) in map {
                    match value {
                        Value::Null => {}
                        Value::Bool(b) => point = point.field(key.clone(), *b),
                        Value::Number(n) => {
                            if let Some(i) = n.as_i64() {
                                point = point.field(key.clone(), i);
                            } else if let Some(f) = n.as_f64() {
                                point = point.field(key.clone(), f);
                            }
                        }
                        Value::String(s) => point = point.field(key.clone(), s.clone()),
                        nested => point = point.field(key.clone(), nested.to_string()),
                    }
                }
            }
            Value::Null => {}
            other => point = point.field("payload", other.to_string()),
        }

        point
    }
}
