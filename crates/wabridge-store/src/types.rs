use serde::{Deserialize, Serialize};
use wabridge_core::{AccountId, ChatId, Label};

/// Lifecycle state of a [`Turn`]. Advances only forward — terminal states
/// (`Delivered`, `Skipped`, `Error`) are observed only, never re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Pending,
    Ready,
    Sending,
    Delivered,
    Skipped,
    Error,
}

impl TurnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStatus::Pending => "pending",
            TurnStatus::Ready => "ready",
            TurnStatus::Sending => "sending",
            TurnStatus::Delivered => "delivered",
            TurnStatus::Skipped => "skipped",
            TurnStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for TurnStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TurnStatus::Pending),
            "ready" => Ok(TurnStatus::Ready),
            "sending" => Ok(TurnStatus::Sending),
            "delivered" => Ok(TurnStatus::Delivered),
            "skipped" => Ok(TurnStatus::Skipped),
            "error" => Ok(TurnStatus::Error),
            other => Err(format!("unknown turn status: {other}")),
        }
    }
}

/// A single merged item inside a turn's `items[]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnItem {
    Text { ts: i64, text: String },
    Voice {
        ts: i64,
        gcs_uri: String,
        content_type: String,
        filename: String,
    },
}

impl TurnItem {
    pub fn ts(&self) -> i64 {
        match self {
            TurnItem::Text { ts, .. } => *ts,
            TurnItem::Voice { ts, .. } => *ts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Text,
    Voice,
}

/// Derived routing hints computed by the TurnAssembler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hints {
    pub last_inbound: Modality,
    pub explicit: Option<Modality>,
    pub lang: Option<String>,
}

/// The answer written back by the external AI worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "modality", rename_all = "snake_case")]
pub enum TurnResponse {
    Text { text: String },
    Voice { text: Option<String>, audio: AudioRef },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioRef {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnErrorDetail {
    pub stage: String,
    pub detail: String,
}

/// Identifies the chat/session/account a turn belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnMeta {
    pub account_id: AccountId,
    pub label: Label,
    pub chat_id: ChatId,
    pub window_id: String,
}

/// A persisted conversational turn: the unit of buffered inbound items that
/// gets assembled, policy-checked, and dispatched as one outbound reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub status: TurnStatus,
    pub opened_at: i64,
    pub closed_at: i64,
    pub meta: TurnMeta,
    pub hints: Hints,
    pub items: Vec<TurnItem>,
    pub response: Option<TurnResponse>,
    pub claimed_at: Option<i64>,
    pub delivered_at: Option<i64>,
    pub skipped_at: Option<i64>,
    pub wa_message_id: Option<String>,
    pub error: Option<TurnErrorDetail>,
}

impl Turn {
    pub fn window_id(&self) -> &str {
        &self.meta.window_id
    }
}

/// Bot policy stored on a session document (`/accounts/{aid}/sessions/{label}.bot`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPolicyDoc {
    pub enabled: bool,
    pub receive_from_bots: bool,
    pub mode: PolicyMode,
    pub allowlist: Vec<String>,
    pub blocklist: Vec<String>,
}

impl Default for SessionPolicyDoc {
    fn default() -> Self {
        Self {
            enabled: true,
            receive_from_bots: false,
            mode: PolicyMode::All,
            allowlist: Vec::new(),
            blocklist: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    All,
    Allowlist,
    Blocklist,
}

impl std::str::FromStr for PolicyMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "all" => Ok(PolicyMode::All),
            "allowlist" => Ok(PolicyMode::Allowlist),
            "blocklist" => Ok(PolicyMode::Blocklist),
            other => Err(format!("unknown policy mode: {other}")),
        }
    }
}

impl std::fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PolicyMode::All => "all",
            PolicyMode::Allowlist => "allowlist",
            PolicyMode::Blocklist => "blocklist",
        };
        write!(f, "{s}")
    }
}

/// Per-chat override (`/threads/{chatId}/settings/__root__`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatPolicyDoc {
    /// `None` means "inherit the session's `enabled` flag".
    pub bot_enabled: Option<bool>,
    pub preferred_modality: Option<Modality>,
}

/// Persisted session metadata row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub account_id: AccountId,
    pub label: Label,
    pub wa_id: Option<String>,
    pub status: String,
    pub created_at: String,
    pub last_ready_at: Option<String>,
    pub policy: SessionPolicyDoc,
}
