use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use wabridge_core::{AccountId, ChatId, Label, SessionRef};
use wabridge_policy::{allow_send, PolicyCache};
use wabridge_sessions::{SessionSupervisor, WaClient};
use wabridge_store::{Store, Turn, TurnResponse};

use crate::error::Result;

/// Default poll cadence per active session — one poll loop per
/// `(accountId, label)` instead of a shared live-query push, since this
/// core uses a concrete SQL store rather than a reactive one.
pub const DEFAULT_OUTBOX_POLL_MS: u64 = 2_000;

/// Drives `ready` turns for one `(accountId, label)` through claim → policy
/// re-check → dispatch → terminal state. Mirrors `SchedulerEngine::tick()`'s
/// claim-then-act shape, scoped to a single session instead of the whole
/// jobs table.
pub struct OutboxWatcher {
    store: Arc<Store>,
    policy: Arc<PolicyCache>,
    sessions: Arc<SessionSupervisor>,
    fallback_text: String,
    poll_ms: u64,
}

impl OutboxWatcher {
    pub fn new(
        store: Arc<Store>,
        policy: Arc<PolicyCache>,
        sessions: Arc<SessionSupervisor>,
        fallback_text: impl Into<String>,
    ) -> Self {
        Self {
            store,
            policy,
            sessions,
            fallback_text: fallback_text.into(),
            poll_ms: DEFAULT_OUTBOX_POLL_MS,
        }
    }

    pub fn with_poll_ms(mut self, poll_ms: u64) -> Self {
        self.poll_ms = poll_ms;
        self
    }

    /// One pass: pick up every `ready` turn for this session and try to
    /// dispatch each. Returns the window ids it attempted, for tests.
    pub async fn tick(&self, account_id: &AccountId, label: &Label) -> Result<Vec<String>> {
        let ready = self.store.poll_ready(account_id, label)?;
        let mut attempted = Vec::with_capacity(ready.len());
        for turn in ready {
            attempted.push(turn.window_id().to_string());
            self.try_dispatch(account_id, label, turn).await?;
        }
        Ok(attempted)
    }

    async fn try_dispatch(&self, account_id: &AccountId, label: &Label, turn: Turn) -> Result<()> {
        let window_id = turn.window_id().to_string();
        let Some(claimed) = self.store.claim_ready_turn(&window_id)? else {
            // Another watcher instance won the race — nothing to do.
            return Ok(());
        };

        let chat_id = claimed.meta.chat_id.clone();
        let session_policy = self.policy.session_policy(account_id, label)?;
        let chat_policy = self.policy.chat_policy(account_id, label, &chat_id)?;

        if !allow_send(&session_policy, &chat_policy, chat_id.as_str()) {
            info!(%window_id, "policy denied turn mid-flight, skipping");
            self.store.mark_turn_skipped(&window_id)?;
            return Ok(());
        }

        let Some(client) = self.sessions.client(&SessionRef::new(account_id.clone(), label.clone())) else {
            warn!(%window_id, "no client registered for session, marking error");
            self.store
                .mark_turn_error(&window_id, "dispatch", "session not running")?;
            return Ok(());
        };

        match send(client.as_ref(), &chat_id, &claimed, &self.fallback_text).await {
            Ok(wa_message_id) => {
                self.store.mark_turn_delivered(&window_id, &wa_message_id)?;
            }
            Err(e) => {
                error!(%window_id, error = %e, "dispatch failed");
                self.store.mark_turn_error(&window_id, "send", &e.to_string())?;
            }
        }
        Ok(())
    }
}

async fn send(
    client: &dyn WaClient,
    chat_id: &ChatId,
    turn: &Turn,
    fallback_text: &str,
) -> std::result::Result<String, wabridge_sessions::SessionError> {
    match &turn.response {
        Some(TurnResponse::Text { text }) => client.send_text(chat_id, text).await,
        Some(TurnResponse::Voice { text, audio }) => {
            client
                .send_media(chat_id, &audio.url, "audio/ogg", text.as_deref())
                .await
        }
        None => client.send_text(chat_id, fallback_text).await,
    }
}

/// Spawns a background task polling `(accountId, label)` every `poll_ms`.
pub fn spawn_watcher(
    watcher: Arc<OutboxWatcher>,
    account_id: AccountId,
    label: Label,
) -> tokio::task::JoinHandle<()> {
    let poll_ms = watcher.poll_ms;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(poll_ms));
        loop {
            ticker.tick().await;
            if let Err(e) = watcher.tick(&account_id, &label).await {
                error!(account_id = %account_id, label = %label, error = %e, "outbox tick failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wabridge_store::{Hints, Modality, SessionPolicyDoc};

    fn hints() -> Hints {
        Hints {
            last_inbound: Modality::Text,
            explicit: None,
            lang: None,
        }
    }

    fn setup() -> (Arc<Store>, Arc<PolicyCache>, Arc<SessionSupervisor>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store.get_or_create_session("acct1", "main").unwrap();
        let policy = Arc::new(PolicyCache::new(store.clone()));
        let sessions = Arc::new(SessionSupervisor::new());
        (store, policy, sessions)
    }

    #[tokio::test]
    async fn policy_denied_mid_flight_skips_instead_of_sending() {
        let (store, policy, sessions) = setup();
        let chat = ChatId::from("5551234@c.us");
        store
            .open_turn(&"acct1".to_string(), &"main".to_string(), &chat, "w1", 1, &hints())
            .unwrap();
        store.close_turn_ready("w1", &[], 2, &hints()).unwrap();

        // Bot gets disabled after the turn was already buffered.
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

        let watcher = Arc::new(OutboxWatcher::new(store.clone(), policy, sessions, "fallback"));
        watcher.tick(&"acct1".to_string(), &"main".to_string()).await.unwrap();

        let turn = store.turn("w1").unwrap().unwrap();
        assert_eq!(turn.status, wabridge_store::TurnStatus::Skipped);
    }

    #[tokio::test]
    async fn second_claim_attempt_is_a_no_op() {
        let (store, policy, sessions) = setup();
        let chat = ChatId::from("5551234@c.us");
        store
            .open_turn(&"acct1".to_string(), &"main".to_string(), &chat, "w2", 1, &hints())
            .unwrap();
        store.close_turn_ready("w2", &[], 2, &hints()).unwrap();

        let first = store.claim_ready_turn("w2").unwrap();
        assert!(first.is_some());

        let watcher = Arc::new(OutboxWatcher::new(store.clone(), policy, sessions, "fallback"));
        // Turn is already `sending`, so poll_ready won't surface it again —
        // a concurrent tick naturally excludes it.
        let attempted = watcher.tick(&"acct1".to_string(), &"main".to_string()).await.unwrap();
        assert!(attempted.is_empty());
    }
}
