use thiserror::Error;

#[derive(Debug, Error)]
pub enum BufferError {
    #[error(transparent)]
    Store(#[from] wabridge_store::StoreError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Policy(#[from] wabridge_policy::PolicyError),

    #[error(transparent)]
    Media(#[from] wabridge_media::MediaError),
}

pub type Result<T> = std::result::Result<T, BufferError>;
