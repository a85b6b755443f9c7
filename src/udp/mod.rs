pub mod listener;

pub use listener::{run_listener, EventDispatch, ListenerKind};
