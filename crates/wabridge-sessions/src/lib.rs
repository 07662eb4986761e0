pub mod client;
pub mod error;
pub mod supervisor;
pub mod types;

pub use client::WaClient;
pub use error::SessionError;
pub use supervisor::{restore_all_from_fs, SessionSupervisor};
pub use types::SessionSnapshot;
