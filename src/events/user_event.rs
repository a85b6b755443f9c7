use crate::destinations::point::Point;
use crate::events::EventParseError;

/// Source tag framing a user-activity datagram.
pub const USER_EVENT_TAG: &str = "/proxy-connection/";

/// Minimum number of semicolon-separated fields in a user event.
const MIN_FIELDS: usize = 8;

/// Proxy session activity reported by Qlik Sense over UDP.
///
/// Wire format, semicolon-delimited:
/// `/proxy-connection/;host;command;user_directory;user_id;origin;context;message`.
/// Additional semicolons belong to the trailing message.
#[derive(Debug, Clone, PartialEq)]
pub struct UserEvent {
    pub host: String,
    pub command: String,
    pub user_directory: String,
    pub user_id: String,
    pub origin: String,
    pub context: String,
    pub message: String,
}

impl UserEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, EventParseError> {
        let text = std::str::from_utf8(payload)?;
        let parts: Vec<&str> = text.split(';').collect();

        if parts.len() < MIN_FIELDS {
            return Err(EventParseError::FieldCount {
                got: parts.len(),
                expected: MIN_FIELDS,
            });
        }
        if parts[0].trim() != USER_EVENT_TAG {
            return Err(EventParseError::UnknownSource(parts[0].trim().to_string()));
        }

        Ok(Self {
            host: parts[1].trim().to_string(),
            command: parts[2].trim().to_string(),
            user_directory: parts[3].trim().to_string(),
            user_id: parts[4].trim().to_string(),
            origin: parts[5].trim().to_string(),
            context: parts[6].trim().to_string(),
            message: parts[7..].join(";").trim().to_string(),
        })
    }

    pub fn to_point(&self) -> Point {
        Point::new("user_event")
            .tag("host", &self.host)
            .tag("command", &self.command)
            .tag("user_directory", &self.user_directory)
            .tag("user_id", &self.user_id)
            .tag("origin", &self.origin)
            .field(
                "user_full",
                format!("{}\\{}", self.user_directory, self.user_id),
            )
            .field("context", self.context.clone())
            .field("message", self.message.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destinations::point::FieldValue;

    #[test]
    fn test_parse_start_session() {
        let payload =
            b"/proxy-connection/;qs1.example.com;Start session;ACME;alice;10.0.0.5;AppAccess;session started";
        let event = UserEvent::parse(payload).unwrap();

        assert_eq!(event.host, "qs1.example.com");
        assert_eq!(event.command, "Start session");
        assert_eq!(event.user_directory, "ACME");
        assert_eq!(event.user_id, "alice");
        assert_eq!(event.origin, "10.0.0.5");
        assert_eq!(event.context, "AppAccess");
        assert_eq!(event.message, "session started");
    }

    #[test]
    fn test_semicolons_in_message_are_preserved() {
        let payload =
            b"/proxy-connection/;qs1;Stop session;ACME;bob;;ctx;part one;part two;part three";
        let event = UserEvent::parse(payload).unwrap();
        assert_eq!(event.message, "part one;part two;part three");
    }

    #[test]
    fn test_wrong_source_tag_is_rejected() {
        let payload = b"/something-else/;qs1;cmd;dir;user;origin;ctx;msg";
        assert!(matches!(
            UserEvent::parse(payload),
            Err(EventParseError::UnknownSource(_))
        ));
    }

    #[test]
    fn test_too_few_fields_is_rejected() {
        let payload = b"/proxy-connection/;qs1;cmd";
        assert!(matches!(
            UserEvent::parse(payload),
            Err(EventParseError::FieldCount { got: 3, .. })
        ));
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let payload = [0xff, 0xfe, 0x00];
        assert!(matches!(
            UserEvent::parse(&payload),
            Err(EventParseError::NotUtf8(_))
        ));
    }

    #[test]
    fn test_to_point() {
        let payload = b"/proxy-connection/;qs1;Start session;ACME;alice;10.0.0.5;ctx;msg";
        let point = UserEvent::parse(payload).unwrap().to_point();

        assert_eq!(point.measurement, "user_event");
        assert_eq!(point.tags["host"], "qs1");
        assert_eq!(point.tags["command"], "Start session");
        assert_eq!(
            point.fields["user_full"],
            FieldValue::Text("ACME\\alice".to_string())
        );
    }
}
