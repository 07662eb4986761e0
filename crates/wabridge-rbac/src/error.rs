use thiserror::Error;

#[derive(Debug, Error)]
pub enum RbacError {
    #[error(transparent)]
    Store(#[from] wabridge_store::StoreError),
}

pub type Result<T> = std::result::Result<T, RbacError>;
