use std::sync::Arc;

use dashmap::DashMap;
use wabridge_core::now_millis;
use wabridge_store::{ChatPolicyDoc, SessionPolicyDoc, Store};

use crate::error::Result;

/// PolicyCache per-entry TTL (60s).
pub const POLICY_TTL_SECS: u64 = 60;

struct Cached<T> {
    value: T,
    cached_at: i64,
}

/// Caches the three policy lookups the hot inbound/outbound path needs on
/// every message, so a burst of traffic doesn't hammer the store. Three
/// independent lanes because each has a different key shape and refresh
/// source:
///
/// - session view: `(accountId, label) -> SessionPolicyDoc`
/// - chat view: `(accountId, label, chatId) -> ChatPolicyDoc`
/// - self ids: `accountId -> Vec<waId>` (every session's own number, for
///   cross-session bot-loop detection)
pub struct PolicyCache {
    store: Arc<Store>,
    ttl_secs: u64,
    sessions: DashMap<(String, String), Cached<SessionPolicyDoc>>,
    chats: DashMap<(String, String, String), Cached<ChatPolicyDoc>>,
    self_ids: DashMap<String, Cached<Vec<String>>>,
}

impl PolicyCache {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            ttl_secs: POLICY_TTL_SECS,
            sessions: DashMap::new(),
            chats: DashMap::new(),
            self_ids: DashMap::new(),
        }
    }

    pub fn with_ttl_secs(store: Arc<Store>, ttl_secs: u64) -> Self {
        Self {
            store,
            ttl_secs,
            sessions: DashMap::new(),
            chats: DashMap::new(),
            self_ids: DashMap::new(),
        }
    }

    pub fn session_policy(&self, account_id: &str, label: &str) -> Result<SessionPolicyDoc> {
        let key = (account_id.to_string(), label.to_string());
        if let Some(hit) = self.sessions.get(&key) {
            if self.is_fresh(hit.cached_at) {
                return Ok(hit.value.clone());
            }
        }
        let record = self.store.get_or_create_session(account_id, label)?;
        let policy = record.policy;
        self.sessions.insert(
            key,
            Cached {
                value: policy.clone(),
                cached_at: now_millis(),
            },
        );
        Ok(policy)
    }

    pub fn chat_policy(
        &self,
        account_id: &str,
        label: &str,
        chat_id: &wabridge_core::ChatId,
    ) -> Result<ChatPolicyDoc> {
        let key = (
            account_id.to_string(),
            label.to_string(),
            chat_id.as_str().to_string(),
        );
        if let Some(hit) = self.chats.get(&key) {
            if self.is_fresh(hit.cached_at) {
                return Ok(hit.value.clone());
            }
        }
        let policy = self.store.chat_policy(account_id, label, chat_id)?;
        self.chats.insert(
            key,
            Cached {
                value: policy.clone(),
                cached_at: now_millis(),
            },
        );
        Ok(policy)
    }

    pub fn self_ids(&self, account_id: &str) -> Result<Vec<String>> {
        if let Some(hit) = self.self_ids.get(account_id) {
            if self.is_fresh(hit.cached_at) {
                return Ok(hit.value.clone());
            }
        }
        let ids = self
            .store
            .list_sessions(account_id)?
            .into_iter()
            .filter_map(|s| s.wa_id)
            .collect::<Vec<_>>();
        self.self_ids.insert(
            account_id.to_string(),
            Cached {
                value: ids.clone(),
                cached_at: now_millis(),
            },
        );
        Ok(ids)
    }

    /// Drop every cached entry for `(accountId, label)` so the next lookup
    /// re-reads from the store. Called after a policy mutation.
    pub fn invalidate_session(&self, account_id: &str, label: &str) {
        self.sessions
            .remove(&(account_id.to_string(), label.to_string()));
        self.chats
            .retain(|(a, l, _), _| !(a == account_id && l == label));
    }

    fn is_fresh(&self, cached_at: i64) -> bool {
        now_millis().saturating_sub(cached_at) < (self.ttl_secs as i64) * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wabridge_core::ChatId;
    use wabridge_store::SessionPolicyDoc;

    #[test]
    fn session_policy_is_cached_between_calls() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let cache = PolicyCache::new(store.clone());

        let first = cache.session_policy("acct1", "main").unwrap();
        store
            .set_session_policy(
                "acct1",
                "main",
                &SessionPolicyDoc {
                    enabled: false,
                    ..Default::default()
                },
            )
            .unwrap();
        let second = cache.session_policy("acct1", "main").unwrap();
        assert_eq!(first.enabled, second.enabled);
    }

    #[test]
    fn invalidate_forces_refresh() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let cache = PolicyCache::with_ttl_secs(store.clone(), 60);

        cache.session_policy("acct1", "main").unwrap();
        store
            .set_session_policy(
                "acct1",
                "main",
                &SessionPolicyDoc {
                    enabled: false,
                    ..Default::default()
                },
            )
            .unwrap();
        cache.invalidate_session("acct1", "main");
        let refreshed = cache.session_policy("acct1", "main").unwrap();
        assert!(!refreshed.enabled);
    }

    #[test]
    fn chat_policy_defaults_when_unset() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let cache = PolicyCache::new(store);
        let chat = ChatId::from("5551234@c.us");
        let policy = cache.chat_policy("acct1", "main", &chat).unwrap();
        assert!(policy.bot_enabled.is_none());
    }
}
