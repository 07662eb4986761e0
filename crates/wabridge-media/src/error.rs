use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("blob store error: {0}")]
    Store(String),

    #[error("media not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, MediaError>;
