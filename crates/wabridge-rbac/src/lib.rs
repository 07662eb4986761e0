pub mod error;
pub mod hub;
pub mod resolver;
pub mod types;

pub use error::RbacError;
pub use hub::AclHub;
pub use resolver::{resolve_allowed, role_for};
pub use types::AllowedSessions;
