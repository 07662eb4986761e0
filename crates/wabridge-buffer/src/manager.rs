use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::{debug, info};
use wabridge_core::{normalize_timestamp_ms, now_millis, AccountId, ChatId, Label};
use wabridge_media::MediaCache;
use wabridge_policy::PolicyCache;
use wabridge_store::{Store, TurnItem};

use crate::assembler::TurnAssembler;
use crate::error::Result;

/// One inbound item as received from the chat-platform client, before ts
/// coercion or blob persistence. `media_id` is the platform's own id for the
/// attachment, used as the `MediaCache` key so a re-delivered event doesn't
/// re-download the same audio.
pub enum InboundContent {
    Text {
        ts: i64,
        text: String,
    },
    Voice {
        ts: i64,
        media_id: String,
        bytes: Vec<u8>,
        content_type: String,
        filename: String,
    },
}

impl InboundContent {
    fn raw_ts(&self) -> i64 {
        match self {
            InboundContent::Text { ts, .. } => *ts,
            InboundContent::Voice { ts, .. } => *ts,
        }
    }
}

/// Default per-chat silence before a buffer is flushed into a ready turn.
pub const DEFAULT_DEBOUNCE_MS: u64 = 30_000;
/// Default idle time before an abandoned buffer is garbage-collected.
pub const DEFAULT_GC_IDLE_MS: u64 = 30 * 60_000;
/// Buffer GC sweep cadence.
pub const GC_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct BufferConfig {
    pub debounce_ms: u64,
    /// 0 disables the hard cap.
    pub hard_cap_ms: u64,
    pub gc_idle_ms: u64,
    pub finalizer_words: Vec<String>,
    pub explicit_voice_words: Vec<String>,
    pub explicit_text_words: Vec<String>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            hard_cap_ms: 0,
            gc_idle_ms: DEFAULT_GC_IDLE_MS,
            finalizer_words: Vec::new(),
            explicit_voice_words: Vec::new(),
            explicit_text_words: Vec::new(),
        }
    }
}

struct BufferState {
    window_id: String,
    items: Vec<TurnItem>,
    opened_at: i64,
    last_push: i64,
}

/// Accumulates inbound items per `(accountId, label, chatId)` and flushes
/// them into a `ready` turn once the chat goes quiet for `debounce_ms`, a
/// finalizer phrase arrives, or (if enabled) `hard_cap_ms` total buffering
/// time is reached. Abandoned buffers (no flush-worthy activity for
/// `gc_idle_ms`) are dropped without ever becoming a turn.
///
/// A single background sweep drives every transition, the same shape as
/// `SchedulerEngine::tick()`'s claim-then-act loop, rather than one Tokio
/// task per chat — buffers vastly outnumber concurrently-active chats, so a
/// per-key actor would mean a lot of mostly-idle tasks.
pub struct BufferManager {
    store: Arc<Store>,
    policy: Arc<PolicyCache>,
    media: Arc<MediaCache>,
    config: BufferConfig,
    buffers: DashMap<(AccountId, Label, String), Mutex<BufferState>>,
}

impl BufferManager {
    pub fn new(
        store: Arc<Store>,
        policy: Arc<PolicyCache>,
        media: Arc<MediaCache>,
        config: BufferConfig,
    ) -> Self {
        Self {
            store,
            policy,
            media,
            config,
            buffers: DashMap::new(),
        }
    }

    fn assembler(&self) -> TurnAssembler<'_> {
        TurnAssembler::new(
            &self.config.finalizer_words,
            &self.config.explicit_voice_words,
            &self.config.explicit_text_words,
        )
    }

    /// Push one inbound item into the buffer for this chat, opening a new
    /// pending turn in the store if none is active yet. Returns `true` if
    /// the push should trigger an immediate flush (a finalizer phrase was
    /// present). Returns `false` without buffering anything if policy denies
    /// the message (own echo, cross-bot loop, or bot disabled for this
    /// session/chat).
    pub async fn push(
        &self,
        account_id: &AccountId,
        label: &Label,
        chat_id: &ChatId,
        from_me: bool,
        is_from_bot: bool,
        content: InboundContent,
    ) -> Result<bool> {
        let session_policy = self.policy.session_policy(account_id, label)?;
        let chat_policy = self.policy.chat_policy(account_id, label, chat_id)?;
        if !wabridge_policy::allow_process(
            &session_policy,
            &chat_policy,
            chat_id.as_str(),
            from_me,
            is_from_bot,
        ) {
            return Ok(false);
        }

        let ts = normalize_timestamp_ms(content.raw_ts());
        let item = match content {
            InboundContent::Text { text, .. } => TurnItem::Text { ts, text },
            InboundContent::Voice {
                media_id,
                bytes,
                content_type,
                filename,
                ..
            } => {
                let gcs_uri = self
                    .media
                    .resolve(&media_id, move || bytes, &content_type)
                    .await?;
                TurnItem::Voice {
                    ts,
                    gcs_uri,
                    content_type,
                    filename,
                }
            }
        };

        let key = (account_id.clone(), label.clone(), chat_id.as_str().to_string());
        let now = now_millis();

        let finalizer_hit = match &item {
            TurnItem::Text { text, .. } => self.assembler().contains_finalizer(text),
            TurnItem::Voice { .. } => false,
        };

        if !self.buffers.contains_key(&key) {
            let window_id = format!("{account_id}.{label}.{}.{ts}", chat_id.as_str());
            self.store.open_turn(
                account_id,
                label,
                chat_id,
                &window_id,
                ts,
                &placeholder_hints(),
            )?;
            self.buffers.insert(
                key.clone(),
                Mutex::new(BufferState {
                    window_id,
                    items: Vec::new(),
                    opened_at: ts,
                    last_push: now,
                }),
            );
        }

        {
            let entry = self.buffers.get(&key).unwrap();
            let mut state = entry.lock().unwrap();
            let window_id = state.window_id.clone();
            state.items.push(item.clone());
            state.last_push = now;
            drop(state);
            self.store
                .append_turn_item(&window_id, &serde_json::to_string(&item)?)?;
        }

        if finalizer_hit {
            self.flush(account_id, label, chat_id)?;
        }

        Ok(finalizer_hit)
    }

    /// Close the buffer's turn as `ready`, persisting the assembler's
    /// sorted/merged item list and the hints derived from it. `closed_at` is
    /// the last item's ts, matching `openedAt` being the first item's ts — no
    /// wall-clock reads once the buffer has content. No-op if there is no
    /// open buffer for this chat.
    pub fn flush(&self, account_id: &AccountId, label: &Label, chat_id: &ChatId) -> Result<()> {
        let key = (account_id.clone(), label.clone(), chat_id.as_str().to_string());
        let Some((_, state)) = self.buffers.remove(&key) else {
            return Ok(());
        };
        let state = state.into_inner().unwrap();
        let opened_at = state.opened_at;
        let (merged, hints) = self.assembler().assemble(state.items);
        let closed_at = merged.last().map(|i| i.ts()).unwrap_or(opened_at);
        self.store
            .close_turn_ready(&state.window_id, &merged, closed_at, &hints)?;
        info!(window_id = %state.window_id, "buffer flushed to ready turn");
        Ok(())
    }

    /// One sweep pass: flush buffers quiet past `debounce_ms` (or past
    /// `hard_cap_ms` total age, if enabled), and drop buffers idle past
    /// `gc_idle_ms` without ever flushing.
    pub fn sweep(&self) -> Result<()> {
        let now = now_millis();
        let mut to_flush = Vec::new();
        let mut to_drop = Vec::new();

        for entry in self.buffers.iter() {
            let state = entry.value().lock().unwrap();
            let quiet_for = now.saturating_sub(state.last_push);
            let age = now.saturating_sub(state.opened_at);

            let hard_cap_hit = self.config.hard_cap_ms > 0 && age as u64 >= self.config.hard_cap_ms;
            if quiet_for as u64 >= self.config.debounce_ms || hard_cap_hit {
                to_flush.push(entry.key().clone());
            } else if quiet_for as u64 >= self.config.gc_idle_ms {
                to_drop.push(entry.key().clone());
            }
        }

        for (account_id, label, chat_id) in to_flush {
            self.flush(&account_id, &label, &ChatId::from(chat_id.clone()))?;
        }
        for key in to_drop {
            if let Some((_, state)) = self.buffers.remove(&key) {
                debug!(window_id = %state.into_inner().unwrap().window_id, "buffer abandoned by GC");
            }
        }
        Ok(())
    }

    pub fn open_buffer_count(&self) -> usize {
        self.buffers.len()
    }
}

fn placeholder_hints() -> wabridge_store::Hints {
    wabridge_store::Hints {
        last_inbound: wabridge_store::Modality::Text,
        explicit: None,
        lang: None,
    }
}

/// Spawns a background task that sweeps `manager` every [`GC_SWEEP_INTERVAL_SECS`].
pub fn spawn_sweeper(manager: Arc<BufferManager>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(GC_SWEEP_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            if let Err(e) = manager.sweep() {
                tracing::error!(error = %e, "buffer sweep failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wabridge_media::{InMemoryBlobStore, MediaCache};

    fn chat() -> ChatId {
        ChatId::from("5551234@c.us")
    }

    fn manager(store: Arc<Store>, config: BufferConfig) -> BufferManager {
        let policy = Arc::new(PolicyCache::new(store.clone()));
        let media = Arc::new(MediaCache::new(Arc::new(InMemoryBlobStore::new())));
        BufferManager::new(store, policy, media, config)
    }

    fn text(ts: i64, s: &str) -> InboundContent {
        InboundContent::Text {
            ts,
            text: s.to_string(),
        }
    }

    #[tokio::test]
    async fn push_opens_and_flush_closes_turn() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store.get_or_create_session("acct1", "main").unwrap();
        let manager = manager(store.clone(), BufferConfig::default());

        manager
            .push(
                &"acct1".to_string(),
                &"main".to_string(),
                &chat(),
                false,
                false,
                text(1, "hola, necesito ayuda con mi pedido"),
            )
            .await
            .unwrap();
        assert_eq!(manager.open_buffer_count(), 1);

        manager
            .flush(&"acct1".to_string(), &"main".to_string(), &chat())
            .unwrap();
        assert_eq!(manager.open_buffer_count(), 0);
        let ready = store.poll_ready("acct1", "main").unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].opened_at, 1000);
        assert_eq!(ready[0].closed_at, 1000);
    }

    #[tokio::test]
    async fn window_id_is_derived_from_account_label_chat_and_opened_at() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store.get_or_create_session("acct1", "main").unwrap();
        let manager = manager(store.clone(), BufferConfig::default());

        manager
            .push(
                &"acct1".to_string(),
                &"main".to_string(),
                &chat(),
                false,
                false,
                text(1, "hola, necesito ayuda con mi pedido"),
            )
            .await
            .unwrap();
        manager
            .flush(&"acct1".to_string(), &"main".to_string(), &chat())
            .unwrap();
        let ready = store.poll_ready("acct1", "main").unwrap();
        assert_eq!(ready[0].window_id(), "acct1.main.5551234@c.us.1000");
    }

    #[tokio::test]
    async fn finalizer_phrase_triggers_immediate_flush() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store.get_or_create_session("acct1", "main").unwrap();
        let mut config = BufferConfig::default();
        config.finalizer_words = vec!["gracias".to_string()];
        let manager = manager(store.clone(), config);

        let flushed = manager
            .push(
                &"acct1".to_string(),
                &"main".to_string(),
                &chat(),
                false,
                false,
                text(1, "gracias, eso es todo"),
            )
            .await
            .unwrap();
        assert!(flushed);
        assert_eq!(manager.open_buffer_count(), 0);
    }

    #[tokio::test]
    async fn sweep_flushes_buffers_quiet_past_debounce() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store.get_or_create_session("acct1", "main").unwrap();
        let mut config = BufferConfig::default();
        config.debounce_ms = 0;
        let manager = manager(store.clone(), config);

        manager
            .push(
                &"acct1".to_string(),
                &"main".to_string(),
                &chat(),
                false,
                false,
                text(1, "hola buenas tardes como estas"),
            )
            .await
            .unwrap();
        manager.sweep().unwrap();
        assert_eq!(manager.open_buffer_count(), 0);
        assert_eq!(store.poll_ready("acct1", "main").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn disabled_session_denies_push_and_opens_no_buffer() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store.get_or_create_session("acct1", "main").unwrap();
        store
            .set_session_policy(
                "acct1",
                "main",
                &wabridge_store::SessionPolicyDoc {
                    enabled: false,
                    ..Default::default()
                },
            )
            .unwrap();
        let manager = manager(store.clone(), BufferConfig::default());

        let flushed = manager
            .push(
                &"acct1".to_string(),
                &"main".to_string(),
                &chat(),
                false,
                false,
                text(1, "hola"),
            )
            .await
            .unwrap();
        assert!(!flushed);
        assert_eq!(manager.open_buffer_count(), 0);
    }

    #[tokio::test]
    async fn own_echo_is_never_buffered() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store.get_or_create_session("acct1", "main").unwrap();
        let manager = manager(store.clone(), BufferConfig::default());

        manager
            .push(
                &"acct1".to_string(),
                &"main".to_string(),
                &chat(),
                true,
                false,
                text(1, "hola"),
            )
            .await
            .unwrap();
        assert_eq!(manager.open_buffer_count(), 0);
    }

    #[tokio::test]
    async fn voice_item_is_persisted_through_media_cache() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store.get_or_create_session("acct1", "main").unwrap();
        let manager = manager(store.clone(), BufferConfig::default());

        manager
            .push(
                &"acct1".to_string(),
                &"main".to_string(),
                &chat(),
                false,
                false,
                InboundContent::Voice {
                    ts: 1,
                    media_id: "wamid.voice1".to_string(),
                    bytes: b"fake ogg bytes".to_vec(),
                    content_type: "audio/ogg".to_string(),
                    filename: "note.ogg".to_string(),
                },
            )
            .await
            .unwrap();
        manager
            .flush(&"acct1".to_string(), &"main".to_string(), &chat())
            .unwrap();
        let ready = store.poll_ready("acct1", "main").unwrap();
        match &ready[0].items[0] {
            TurnItem::Voice { gcs_uri, .. } => assert!(gcs_uri.contains("wamid.voice1")),
            other => panic!("expected voice item, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn raw_seconds_timestamp_is_coerced_to_millis() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store.get_or_create_session("acct1", "main").unwrap();
        let manager = manager(store.clone(), BufferConfig::default());

        manager
            .push(
                &"acct1".to_string(),
                &"main".to_string(),
                &chat(),
                false,
                false,
                text(1_700_000_000, "hola"),
            )
            .await
            .unwrap();
        manager
            .flush(&"acct1".to_string(), &"main".to_string(), &chat())
            .unwrap();
        let ready = store.poll_ready("acct1", "main").unwrap();
        assert_eq!(ready[0].opened_at, 1_700_000_000_000);
    }
}
