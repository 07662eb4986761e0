use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} is not running")]
    NotRunning(String),

    #[error("session {0} is already running")]
    AlreadyRunning(String),

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("session is not ready (status: {0})")]
    NotReady(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
