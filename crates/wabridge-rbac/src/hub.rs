use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;
use wabridge_core::AccountId;

use crate::error::Result;
use crate::resolver::resolve_allowed;
use crate::types::AllowedSessions;

/// Publishes live `{role, sessions}` updates per `(accountId, uid)` — a
/// `watch` channel rather than a poll, so a WsHub
/// connection re-evaluates its allowed set the moment an admin-surface call
/// mutates `members` or `acl` instead of on its own timer.
pub struct AclHub {
    store: Arc<wabridge_store::Store>,
    channels: DashMap<(AccountId, String), watch::Sender<AllowedSessions>>,
}

impl AclHub {
    pub fn new(store: Arc<wabridge_store::Store>) -> Self {
        Self {
            store,
            channels: DashMap::new(),
        }
    }

    /// Subscribe to live ACL updates for one member, computing the current
    /// value first so a fresh connection never blocks on a future change.
    pub fn subscribe(&self, account_id: &str, uid: &str) -> Result<watch::Receiver<AllowedSessions>> {
        let key = (account_id.to_string(), uid.to_string());
        if let Some(sender) = self.channels.get(&key) {
            return Ok(sender.subscribe());
        }
        let current = resolve_allowed(&self.store, account_id, uid)?;
        let (tx, rx) = watch::channel(current);
        self.channels.insert(key, tx);
        Ok(rx)
    }

    /// Recompute and push the allowed set for one member. Call after a role
    /// or ACL mutation targeting that member.
    pub fn notify_member_changed(&self, account_id: &str, uid: &str) -> Result<()> {
        let key = (account_id.to_string(), uid.to_string());
        if let Some(sender) = self.channels.get(&key) {
            let updated = resolve_allowed(&self.store, account_id, uid)?;
            debug!(account_id, uid, "acl updated, pushing to subscribers");
            let _ = sender.send(updated);
        }
        Ok(())
    }

    /// Recompute every member subscribed under `account_id`. Call after a
    /// session is created or removed — an Administrator's allowed set is
    /// derived from the live session list, not a stored ACL row, so it must
    /// be refreshed on every subscriber even though no `acl` row changed.
    pub fn notify_sessions_changed(&self, account_id: &str) -> Result<()> {
        for entry in self.channels.iter() {
            let (acct, uid) = entry.key();
            if acct != account_id {
                continue;
            }
            let updated = resolve_allowed(&self.store, acct, uid)?;
            let _ = entry.value().send(updated);
        }
        Ok(())
    }
}
