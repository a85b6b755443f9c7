use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scalar field value of a generic point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// Destination-agnostic record: one measurement with tags, fields, and an
/// optional millisecond timestamp. Built once at enqueue time; adapters turn
/// it into their wire or row representation at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub measurement: String,
    pub timestamp_ms: Option<i64>,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Point {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            timestamp_ms: None,
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_timestamp_ms(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = Some(timestamp_ms);
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Render as one InfluxDB line-protocol line, millisecond precision.
    ///
    /// Returns `None` when no writable field remains; a line without fields
    /// is invalid. Empty tag values and non-finite floats are skipped.
    pub fn to_line_protocol(&self) -> Option<String> {
        let mut rendered_fields = Vec::with_capacity(self.fields.len());
        for (key, value) in &self.fields {
            let rendered = match value {
                FieldValue::Integer(i) => format!("{i}i"),
                FieldValue::Float(f) => {
                    if !f.is_finite() {
                        continue;
                    }
                    f.to_string()
                }
                FieldValue::Boolean(b) => b.to_string(),
                FieldValue::Text(s) => format!("\"{}\"", escape_string_value(s)),
            };
            rendered_fields.push(format!("{}={}", escape_key(key), rendered));
        }

        if rendered_fields.is_empty() {
            return None;
        }

        let mut line = escape_measurement(&self.measurement);
        for (key, value) in &self.tags {
            if value.is_empty() {
                continue;
            }
            line.push(',');
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&escape_key(value));
        }

        line.push(' ');
        line.push_str(&rendered_fields.join(","));

        if let Some(ts) = self.timestamp_ms {
            line.push(' ');
            line.push_str(&ts.to_string());
        }

        Some(line)
    }
}

fn escape_measurement(value: &str) -> String {
    value.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_key(value: &str) -> String {
    value
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

fn escape_string_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
