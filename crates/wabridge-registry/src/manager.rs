use std::sync::Arc;

use tracing::instrument;
use wabridge_core::SessionStatus;
use wabridge_store::{SessionRecord, Store};

use crate::error::Result;

/// Thin persistence wrapper over [`Store`] for session metadata — `status`,
/// `waId`, `createdAt`, `lastReadyAt` — following a get-or-create/upsert
/// shape rather than owning its own connection, since the shared `Store`
/// already persists every crate in this workspace.
pub struct SessionRegistry {
    store: Arc<Store>,
}

impl SessionRegistry {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    #[instrument(skip(self), fields(account_id, label))]
    pub fn get_or_create(&self, account_id: &str, label: &str) -> Result<SessionRecord> {
        Ok(self.store.get_or_create_session(account_id, label)?)
    }

    #[instrument(skip(self), fields(account_id, label))]
    pub fn get(&self, account_id: &str, label: &str) -> Result<Option<SessionRecord>> {
        Ok(self.store.session(account_id, label)?)
    }

    #[instrument(skip(self), fields(account_id))]
    pub fn list(&self, account_id: &str) -> Result<Vec<SessionRecord>> {
        Ok(self.store.list_sessions(account_id)?)
    }

    #[instrument(skip(self), fields(account_id, label, status = %status))]
    pub fn set_status(&self, account_id: &str, label: &str, status: SessionStatus) -> Result<()> {
        Ok(self.store.set_session_status(account_id, label, &status.to_string())?)
    }

    /// Records `waId` and bumps `status`/`lastReadyAt` in one call, matching
    /// the supervisor's single "client is ready" transition.
    #[instrument(skip(self), fields(account_id, label, wa_id))]
    pub fn mark_ready(&self, account_id: &str, label: &str, wa_id: &str) -> Result<()> {
        Ok(self.store.mark_session_ready(account_id, label, wa_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent_through_the_registry() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let registry = SessionRegistry::new(store);
        let a = registry.get_or_create("acct1", "main").unwrap();
        let b = registry.get_or_create("acct1", "main").unwrap();
        assert_eq!(a.created_at, b.created_at);
    }

    #[test]
    fn mark_ready_updates_status_and_wa_id() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let registry = SessionRegistry::new(store);
        registry.get_or_create("acct1", "main").unwrap();
        registry.mark_ready("acct1", "main", "15551234567").unwrap();
        let record = registry.get("acct1", "main").unwrap().unwrap();
        assert_eq!(record.status, "ready");
        assert_eq!(record.wa_id.as_deref(), Some("15551234567"));
    }

    #[test]
    fn list_returns_every_session_for_an_account() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let registry = SessionRegistry::new(store);
        registry.get_or_create("acct1", "main").unwrap();
        registry.get_or_create("acct1", "support").unwrap();
        assert_eq!(registry.list("acct1").unwrap().len(), 2);
    }
}
