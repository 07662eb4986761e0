pub mod error;
pub mod watcher;

pub use error::OutboxError;
pub use watcher::{spawn_watcher, OutboxWatcher, DEFAULT_OUTBOX_POLL_MS};
