use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("session not found: {account_id}/{label}")]
    SessionNotFound { account_id: String, label: String },

    #[error("turn not found: {window_id}")]
    TurnNotFound { window_id: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
