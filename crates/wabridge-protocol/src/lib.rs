pub mod frames;
pub mod handshake;

pub use frames::{AclUpdateMessage, ClientMessage, HelloMessage, ServerMessage, SubscribedMessage};
pub use handshake::{check_token, AuthOutcome};
