use thiserror::Error;

/// Shared error type for the small set of concerns that live in `wabridge-core`
/// itself (config loading, chat id / timestamp coercion). Most domain errors
/// live in the crate that owns the domain (`wabridge-store::StoreError`,
/// `wabridge-sessions::SessionError`, ...).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
