pub mod log_event;
pub mod user_event;

pub use log_event::LogEvent;
pub use user_event::UserEvent;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventParseError {
    #[error("payload is not valid UTF-8")]
    NotUtf8(#[from] std::str::Utf8Error),

    #[error("unexpected field count: got {got}, expected at least {expected}")]
    FieldCount { got: usize, expected: usize },

    #[error("unrecognized message source tag: {0}")]
    UnknownSource(String),
}
