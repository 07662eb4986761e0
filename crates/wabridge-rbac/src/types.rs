use serde::{Deserialize, Serialize};
use wabridge_core::{Label, Role};

/// The set of session labels a member may see, plus the role that decided it.
/// Pushed verbatim to WsHub connections as the `acl_update` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedSessions {
    pub role: Role,
    pub sessions: Vec<Label>,
}
