pub mod engine;
pub mod executor;

pub use engine::{BufferSettings, EventBuffer, FlushError};
pub use executor::{DirectExecutor, FlushExecutor};
