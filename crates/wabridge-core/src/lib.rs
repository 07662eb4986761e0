pub mod config;
pub mod error;
pub mod types;

pub use error::CoreError;
pub use types::{
    now_millis, normalize_timestamp_ms, AccountId, ChatId, Event, EventKind, InboundMessage,
    Label, Role, SessionRef, SessionStatus,
};
