use crate::destinations::point::Point;
use crate::events::EventParseError;
use chrono::{DateTime, NaiveDateTime, Utc};

/// Source tag framing a log-event datagram.
pub const LOG_EVENT_TAG: &str = "/log-event/";

/// Minimum number of semicolon-separated fields in a log event.
const MIN_FIELDS: usize = 6;

/// Server log line forwarded by Qlik Sense over UDP.
///
/// Wire format, semicolon-delimited:
/// `/log-event/;host;level;timestamp;subsystem;message`. Additional
/// semicolons belong to the trailing message. The timestamp is either
/// RFC 3339 or `YYYY-MM-DD hh:mm:ss[.fff]` (taken as UTC); an unparsable
/// timestamp is carried as `None` rather than rejecting the event.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub host: String,
    pub level: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub subsystem: String,
    pub message: String,
}

impl LogEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, EventParseError> {
        let text = std::str::from_utf8(payload)?;
        let parts: Vec<&str> = text.split(';').collect();

        if parts.len() < MIN_FIELDS {
            return Err(EventParseError::FieldCount {
                got: parts.len(),
                expected: MIN_FIELDS,
            });
        }
        if parts[0].trim() != LOG_EVENT_TAG {
            return Err(EventParseError::UnknownSource(parts[0].trim().to_string()));
        }

        Ok(Self {
            host: parts[1].trim().to_string(),
            level: parts[2].trim().to_uppercase(),
            timestamp: parse_timestamp(parts[3].trim()),
            subsystem: parts[4].trim().to_string(),
            message: parts[5..].join(";").trim().to_string(),
        })
    }

    pub fn to_point(&self) -> Point {
        let mut point = Point::new("log_event")
            .tag("host", &self.host)
            .tag("level", &self.level)
            .tag("subsystem", &self.subsystem)
            .field("message", self.message.clone());

        if let Some(ts) = self.timestamp {
            point = point.with_timestamp_ms(ts.timestamp_millis());
        }

        point
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_with_rfc3339_timestamp() {
        let payload =
            b"/log-event/;qs1.example.com;WARN;2026-02-03T12:30:00Z;Engine;out of memory soon";
        let event = LogEvent::parse(payload).unwrap();

        assert_eq!(event.host, "qs1.example.com");
        assert_eq!(event.level, "WARN");
        assert_eq!(
            event.timestamp,
            Some(Utc.with_ymd_and_hms(2026, 2, 3, 12, 30, 0).unwrap())
        );
        assert_eq!(event.subsystem, "Engine");
        assert_eq!(event.message, "out of memory soon");
    }

    #[test]
    fn test_parse_with_naive_timestamp() {
        let payload = b"/log-event/;qs1;error;2026-02-03 12:30:00.500;Proxy;connection refused";
        let event = LogEvent::parse(payload).unwrap();

        assert_eq!(event.level, "ERROR");
        let expected = Utc
            .with_ymd_and_hms(2026, 2, 3, 12, 30, 0)
            .unwrap()
            .checked_add_signed(chrono::Duration::milliseconds(500))
            .unwrap();
        assert_eq!(event.timestamp, Some(expected));
    }

    #[test]
    fn test_unparsable_timestamp_is_tolerated() {
        let payload = b"/log-event/;qs1;INFO;not-a-time;Engine;hello";
        let event = LogEvent::parse(payload).unwrap();
        assert!(event.timestamp.is_none());

        let point = event.to_point();
        assert!(point.timestamp_ms.is_none());
    }

    #[test]
    fn test_semicolons_in_message_are_preserved() {
        let payload = b"/log-event/;qs1;INFO;2026-02-03T12:30:00Z;Engine;a;b;c";
        let event = LogEvent::parse(payload).unwrap();
        assert_eq!(event.message, "a;b;c");
    }

    #[test]
    fn test_wrong_source_tag_is_rejected() {
        let payload = b"/proxy-connection/;qs1;INFO;2026-02-03T12:30:00Z;Engine;msg";
        assert!(matches!(
            LogEvent::parse(payload),
            Err(EventParseError::UnknownSource(_))
        ));
    }

    #[test]
    fn test_to_point() {
        let payload = b"/log-event/;qs1;WARN;2026-02-03T12:30:00Z;Scheduler;task late";
        let point = LogEvent::parse(payload).unwrap().to_point();

        assert_eq!(point.measurement, "log_event");
        assert_eq!(point.tags["level"], "WARN");
        assert_eq!(point.tags["subsystem"], "Scheduler");
        assert_eq!(
            point.timestamp_ms,
            Some(
                Utc.with_ymd_and_hms(2026, 2, 3, 12, 30, 0)
                    .unwrap()
                    .timestamp_millis()
            )
        );
    }
}
