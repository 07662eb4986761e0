use serde::{Deserialize, Serialize};
use wabridge_core::Event;

/// Server → Client push over the hub socket.
///
/// `Event` passes through untagged: its own `type` discriminator (from
/// `EventKind`) already distinguishes it from the three control messages
/// below, so there is no outer envelope to strip on the client side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Hello(HelloMessage),
    AclUpdate(AclUpdateMessage),
    Subscribed(SubscribedMessage),
    Event(Event),
}

pub const PROTOCOL_VERSION: u32 = 1;

/// `{ "type": "hello", "node_id": "...", "protocol": 1, "labels": [...] }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub node_id: String,
    pub protocol: u32,
    pub labels: Vec<String>,
}

impl HelloMessage {
    pub fn new(node_id: impl Into<String>, labels: Vec<String>) -> Self {
        Self {
            kind: "hello".to_string(),
            node_id: node_id.into(),
            protocol: PROTOCOL_VERSION,
            labels,
        }
    }
}

/// Pushed whenever the server revokes or grants labels for this connection's
/// identity, so an already-open socket narrows without reconnecting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclUpdateMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub labels: Vec<String>,
}

impl AclUpdateMessage {
    pub fn new(labels: Vec<String>) -> Self {
        Self {
            kind: "acl_update".to_string(),
            labels,
        }
    }
}

/// Ack for a client `subscribe` request, echoing the narrowing now in effect
/// on every axis (`labels` is the effective session set after intersecting
/// with ACL).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribedMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub labels: Vec<String>,
    pub types: Vec<String>,
    pub chats: Vec<String>,
    #[serde(rename = "fromMe")]
    pub from_me: Option<bool>,
}

impl SubscribedMessage {
    pub fn new(labels: Vec<String>, types: Vec<String>, chats: Vec<String>, from_me: Option<bool>) -> Self {
        Self {
            kind: "subscribed".to_string(),
            labels,
            types,
            chats,
            from_me,
        }
    }
}

/// Client → Server message over the hub socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Narrow what this connection wants events for. Every present field
    /// narrows conjunctively (AND, never OR) against the connection's
    /// ACL'd session set and against whatever this same message already
    /// narrowed on other axes; an empty list means "no restriction on this
    /// axis" rather than "nothing matches". `from_me` absent means "both".
    Subscribe {
        #[serde(default)]
        sessions: Vec<String>,
        #[serde(default)]
        types: Vec<String>,
        #[serde(default)]
        chats: Vec<String>,
        #[serde(rename = "fromMe", default)]
        from_me: Option<bool>,
    },
    Ping,
}
