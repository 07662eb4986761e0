use async_trait::async_trait;
use wabridge_core::{ChatId, SessionStatus};

use crate::error::SessionError;

/// Adapter over one chat-platform client connection.
///
/// Implementations must be `Send + Sync` so they can be stored behind the
/// [`SessionSupervisor`](crate::supervisor::SessionSupervisor) and driven
/// from multiple Tokio tasks. This crate ships only the trait and an
/// in-memory fake (see `tests`); the real WhatsApp Web adapter is out of
/// scope.
#[async_trait]
pub trait WaClient: Send + Sync {
    /// Start (or resume, from persisted auth) the underlying connection.
    /// Implementations drive their own `qr` / `ready` / `auth_failure`
    /// transitions by emitting events, not by blocking this call on them.
    async fn connect(&self) -> Result<(), SessionError>;

    /// Tear the connection down and release any platform session state.
    async fn disconnect(&self) -> Result<(), SessionError>;

    /// Send a plain-text message to `chat_id`. Returns the platform message id.
    async fn send_text(&self, chat_id: &ChatId, text: &str) -> Result<String, SessionError>;

    /// Send a media attachment. `caption` is optional accompanying text.
    async fn send_media(
        &self,
        chat_id: &ChatId,
        media_url: &str,
        content_type: &str,
        caption: Option<&str>,
    ) -> Result<String, SessionError>;

    /// Current connection status, read without blocking.
    fn status(&self) -> SessionStatus;

    /// Download the raw bytes of an inbound message's attached media, given
    /// the `media_url_path` carried on `InboundMessage`. Callers are
    /// expected to hand the result to a blob store and cache the resulting
    /// reference (see `wabridge-media`).
    async fn fetch_media(&self, media_url_path: &str) -> Result<Vec<u8>, SessionError>;
}
