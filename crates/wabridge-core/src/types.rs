use serde::{Deserialize, Serialize};
use std::fmt;

/// The platform-native recipient identifier.
///
/// Normalization rule: if the raw value already contains `@` it is passed
/// through unchanged (it is already a platform-qualified id, e.g. a group
/// id ending in `@g.us`); otherwise only digits are kept and `@c.us` is
/// appended, matching a one-to-one WhatsApp contact id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub String);

impl ChatId {
    /// Normalize a raw recipient string into a canonical `ChatId`.
    ///
    /// Idempotent: normalizing an already-normalized id returns it unchanged.
    pub fn normalize(raw: &str) -> Self {
        if raw.contains('@') {
            return Self(raw.to_string());
        }
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        Self(format!("{digits}@c.us"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChatId {
    fn from(s: &str) -> Self {
        Self::normalize(s)
    }
}

impl From<String> for ChatId {
    fn from(s: String) -> Self {
        Self::normalize(&s)
    }
}

/// Tenant identifier. Opaque — whatever the admin layer assigns.
pub type AccountId = String;

/// Session label within an account, e.g. `"sales"`, `"support"`.
pub type Label = String;

/// Composite key identifying one chat-platform session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionRef {
    pub account_id: AccountId,
    pub label: Label,
}

impl SessionRef {
    pub fn new(account_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            label: label.into(),
        }
    }

    /// `"{accountId}__{label}"` — the on-disk auth-directory naming scheme.
    pub fn disk_key(&self) -> String {
        format!("{}__{}", self.account_id, self.label)
    }
}

impl fmt::Display for SessionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account_id, self.label)
    }
}

/// Lifecycle status of a session's underlying chat-platform client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Starting,
    Scanning,
    Ready,
    Disconnected,
    AuthFailure,
    Error,
    Stopped,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Starting => "starting",
            SessionStatus::Scanning => "scanning",
            SessionStatus::Ready => "ready",
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::AuthFailure => "auth_failure",
            SessionStatus::Error => "error",
            SessionStatus::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "starting" => Ok(SessionStatus::Starting),
            "scanning" => Ok(SessionStatus::Scanning),
            "ready" => Ok(SessionStatus::Ready),
            "disconnected" => Ok(SessionStatus::Disconnected),
            "auth_failure" => Ok(SessionStatus::AuthFailure),
            "error" => Ok(SessionStatus::Error),
            "stopped" => Ok(SessionStatus::Stopped),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// A single inbound message as normalized from the chat-platform client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub chat_id: ChatId,
    pub from_me: bool,
    pub body: String,
    pub message_type: String,
    pub has_media: bool,
    /// Raw platform timestamp — seconds or milliseconds, see `normalize_timestamp_ms`.
    pub wa_timestamp: i64,
    pub media_url_path: Option<String>,
    /// Platform id of the sender (used for loop prevention); for a 1:1 chat
    /// this is the chat id itself, for a group it is the participant id.
    pub sender_wa_id: Option<String>,
}

/// Discriminated event emitted by a `SessionSupervisor`.
///
/// Every variant carries the common envelope fields via [`Event`], matching
/// the "common fields `{ts, accountId, sessionId, waId?}`" shape from the
/// data model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Qr { qr: String },
    Ready { #[serde(rename = "self")] self_wa_id: Option<String> },
    Disconnected { reason: String },
    AuthFailure { err: String },
    Error { err: String },
    Stopped,
    Destroyed,
    Message {
        id: String,
        chat_id: ChatId,
        from_me: bool,
        body: String,
        message_type: String,
        has_media: bool,
        wa_timestamp: i64,
        media_url_path: Option<String>,
    },
    Sent {
        id: String,
        chat_id: ChatId,
        body: String,
        message_type: String,
        from_me: bool,
        wa_timestamp: i64,
    },
}

impl EventKind {
    /// The wire `type` tag, e.g. `"message"`, `"qr"`, `"disconnected"`.
    pub fn type_str(&self) -> &'static str {
        match self {
            EventKind::Qr { .. } => "qr",
            EventKind::Ready { .. } => "ready",
            EventKind::Disconnected { .. } => "disconnected",
            EventKind::AuthFailure { .. } => "auth_failure",
            EventKind::Error { .. } => "error",
            EventKind::Stopped => "stopped",
            EventKind::Destroyed => "destroyed",
            EventKind::Message { .. } => "message",
            EventKind::Sent { .. } => "sent",
        }
    }

    /// The chat this event concerns, for variants that carry one.
    pub fn chat_id(&self) -> Option<&ChatId> {
        match self {
            EventKind::Message { chat_id, .. } | EventKind::Sent { chat_id, .. } => Some(chat_id),
            _ => None,
        }
    }

    /// Whether this event originated from the bridge's own number, for
    /// variants that carry the distinction.
    pub fn from_me(&self) -> Option<bool> {
        match self {
            EventKind::Message { from_me, .. } | EventKind::Sent { from_me, .. } => Some(*from_me),
            _ => None,
        }
    }
}

/// Full event envelope: the discriminated payload plus routing/context fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub ts: i64,
    pub account_id: AccountId,
    /// The session label this event originated from.
    pub session_id: Label,
    pub wa_id: Option<String>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(account_id: impl Into<String>, session_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            ts: now_millis(),
            account_id: account_id.into(),
            session_id: session_id.into(),
            wa_id: None,
            kind,
        }
    }
}

/// Current epoch milliseconds. Centralised so callers never hand-roll the
/// `SystemTime` dance, and so tests can see exactly where "now" is read.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Coerce a raw platform timestamp into milliseconds.
///
/// WhatsApp-style platform timestamps are in seconds; anything already large
/// enough to be milliseconds (>= 10^10) is preserved as-is.
pub fn normalize_timestamp_ms(raw: i64) -> i64 {
    const SECONDS_MS_BOUNDARY: i64 = 10_000_000_000;
    if raw < SECONDS_MS_BOUNDARY {
        raw * 1000
    } else {
        raw
    }
}

/// Role within an account's membership table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Administrator,
    #[default]
    Member,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Administrator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Administrator => write!(f, "administrator"),
            Role::Member => write!(f, "member"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "administrator" | "Administrator" => Ok(Role::Administrator),
            "member" | "Member" => Ok(Role::Member),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_passthrough_when_at_present() {
        let id = ChatId::normalize("12345-6789@g.us");
        assert_eq!(id.as_str(), "12345-6789@g.us");
    }

    #[test]
    fn normalize_digits_gets_c_us_suffix() {
        let id = ChatId::normalize("+1 (555) 123-4567");
        assert_eq!(id.as_str(), "15551234567@c.us");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = ChatId::normalize("5215512345678");
        let twice = ChatId::normalize(once.as_str());
        assert_eq!(once, twice);
    }

    #[test]
    fn timestamp_seconds_are_scaled_to_millis() {
        assert_eq!(normalize_timestamp_ms(1_700_000_000), 1_700_000_000_000);
    }

    #[test]
    fn timestamp_millis_are_preserved() {
        assert_eq!(normalize_timestamp_ms(1_700_000_000_000), 1_700_000_000_000);
    }

    #[test]
    fn timestamp_boundary_is_seconds() {
        assert_eq!(normalize_timestamp_ms(9_999_999_999), 9_999_999_999_000);
        assert_eq!(normalize_timestamp_ms(10_000_000_000), 10_000_000_000);
    }
}
