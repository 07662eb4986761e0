pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use store::Store;
pub use types::{
    AudioRef, ChatPolicyDoc, Hints, Modality, PolicyMode, SessionPolicyDoc, SessionRecord, Turn,
    TurnErrorDetail, TurnItem, TurnMeta, TurnResponse, TurnStatus,
};
