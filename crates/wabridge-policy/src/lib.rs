pub mod cache;
pub mod error;
pub mod rules;

pub use cache::{PolicyCache, POLICY_TTL_SECS};
pub use error::PolicyError;
pub use rules::{allow_process, allow_send};
