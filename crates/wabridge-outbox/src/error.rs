use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error(transparent)]
    Store(#[from] wabridge_store::StoreError),

    #[error(transparent)]
    Policy(#[from] wabridge_policy::PolicyError),

    #[error(transparent)]
    Session(#[from] wabridge_sessions::SessionError),
}

pub type Result<T> = std::result::Result<T, OutboxError>;
