use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error(transparent)]
    Store(#[from] wabridge_store::StoreError),
}

pub type Result<T> = std::result::Result<T, PolicyError>;
