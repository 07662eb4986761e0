use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};
use wabridge_core::{Event, EventKind, SessionRef, SessionStatus};

use crate::client::WaClient;
use crate::error::SessionError;
use crate::types::SessionSnapshot;

/// Minimum delay between reconnect attempts (seconds).
const BACKOFF_BASE_SECS: u64 = 5;
/// Maximum delay between reconnect attempts (seconds).
const BACKOFF_MAX_SECS: u64 = 300; // 5 minutes
/// Maximum number of reconnect attempts before giving up.
const MAX_ATTEMPTS: u32 = 10;
/// Jitter fraction applied to each delay (±10 %).
const JITTER_FRACTION: f64 = 0.10;

/// Capacity of the broadcast channel every subscriber drains from. Slow
/// subscribers miss the oldest events rather than stalling the supervisor.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

struct Supervised {
    client: Arc<dyn WaClient>,
    snapshot: SessionSnapshot,
}

/// Owns every running `WaClient` for one gateway process, keyed by
/// `(accountId, label)`. Mirrors `ChannelManager`'s registry-plus-backoff
/// shape, generalized from a name-keyed single map to the two-part session
/// key this bridge uses everywhere.
pub struct SessionSupervisor {
    sessions: DashMap<SessionRef, Supervised>,
    events: broadcast::Sender<Event>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sessions: DashMap::new(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Register and connect a client for `session`, retrying with backoff on
    /// failure. Returns `AlreadyRunning` if the key is already registered.
    pub async fn start_session(
        &self,
        session: SessionRef,
        client: Arc<dyn WaClient>,
    ) -> Result<(), SessionError> {
        if self.sessions.contains_key(&session) {
            return Err(SessionError::AlreadyRunning(session.to_string()));
        }
        self.sessions.insert(
            session.clone(),
            Supervised {
                client: client.clone(),
                snapshot: SessionSnapshot::default(),
            },
        );

        self.emit(&session, EventKind::Stopped);
        match connect_with_backoff(&session, client.as_ref()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.set_status(&session, SessionStatus::Error);
                self.emit(
                    &session,
                    EventKind::Error {
                        err: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    pub async fn stop_session(&self, session: &SessionRef) -> Result<(), SessionError> {
        let entry = self
            .sessions
            .get(session)
            .ok_or_else(|| SessionError::NotRunning(session.to_string()))?;
        let client = entry.client.clone();
        drop(entry);
        client.disconnect().await?;
        self.set_status(session, SessionStatus::Stopped);
        self.emit(session, EventKind::Stopped);
        Ok(())
    }

    pub fn status(&self, session: &SessionRef) -> Option<SessionStatus> {
        self.sessions.get(session).map(|s| s.snapshot.status)
    }

    pub fn client(&self, session: &SessionRef) -> Option<Arc<dyn WaClient>> {
        self.sessions.get(session).map(|s| s.client.clone())
    }

    pub fn set_status(&self, session: &SessionRef, status: SessionStatus) {
        if let Some(mut entry) = self.sessions.get_mut(session) {
            entry.snapshot.status = status;
        }
    }

    pub fn set_qr(&self, session: &SessionRef, qr: Option<String>) {
        if let Some(mut entry) = self.sessions.get_mut(session) {
            entry.snapshot.qr = qr;
        }
    }

    pub fn set_wa_id(&self, session: &SessionRef, wa_id: Option<String>) {
        if let Some(mut entry) = self.sessions.get_mut(session) {
            entry.snapshot.wa_id = wa_id;
        }
    }

    /// List every session currently registered, sorted for deterministic output.
    pub fn list(&self) -> Vec<(SessionRef, SessionSnapshot)> {
        let mut result: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot.clone()))
            .collect();
        result.sort_by(|a, b| a.0.to_string().cmp(&b.0.to_string()));
        result
    }

    /// Emit an event onto the shared broadcast channel. A send error just
    /// means there are currently no subscribers — not a failure.
    pub fn emit(&self, session: &SessionRef, kind: EventKind) {
        let event = Event::new(session.account_id.clone(), session.label.clone(), kind);
        let _ = self.events.send(event);
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Scans `auth_dir` for previously-persisted session directories (named
/// `{accountId}__{label}`, see `SessionRef::disk_key`) and starts a client
/// for each one found, using `make_client` to construct the adapter.
pub async fn restore_all_from_fs<F>(
    supervisor: &SessionSupervisor,
    auth_dir: &str,
    make_client: F,
) -> Result<Vec<SessionRef>, SessionError>
where
    F: Fn(&SessionRef) -> Arc<dyn WaClient>,
{
    let mut restored = Vec::new();
    let entries = match std::fs::read_dir(auth_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(auth_dir, error = %e, "auth dir unreadable, nothing to restore");
            return Ok(restored);
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let Some((account_id, label)) = name.split_once("__") else {
            continue;
        };
        let session = SessionRef::new(account_id, label);
        let client = make_client(&session);
        info!(session = %session, "restoring persisted session");
        if let Err(e) = supervisor.start_session(session.clone(), client).await {
            error!(session = %session, error = %e, "failed to restore session");
            continue;
        }
        restored.push(session);
    }

    Ok(restored)
}

/// Attempt to connect a single client with exponential backoff and ±10 % jitter.
///
/// Schedule: 5 s → 10 s → 20 s → … → 300 s (cap), up to [`MAX_ATTEMPTS`] tries.
async fn connect_with_backoff(session: &SessionRef, client: &dyn WaClient) -> Result<(), SessionError> {
    let mut delay_secs = BACKOFF_BASE_SECS;

    for attempt in 1..=MAX_ATTEMPTS {
        match client.connect().await {
            Ok(()) => {
                info!(%session, attempt, "client connected successfully");
                return Ok(());
            }
            Err(e) if attempt == MAX_ATTEMPTS => {
                return Err(e);
            }
            Err(e) => {
                let jitter = jitter_secs(delay_secs);
                let total = delay_secs + jitter;
                warn!(
                    %session,
                    attempt,
                    max = MAX_ATTEMPTS,
                    error = %e,
                    retry_after_secs = total,
                    "client connect failed, retrying with backoff"
                );
                sleep(Duration::from_secs(total)).await;
                delay_secs = (delay_secs * 2).min(BACKOFF_MAX_SECS);
            }
        }
    }

    unreachable!("backoff loop exited without returning")
}

/// Return a jitter offset (0 … `JITTER_FRACTION * base_secs`) as integer seconds.
///
/// Uses a simple deterministic pseudo-random value derived from the current
/// monotonic timestamp, avoiding a rand dependency.
fn jitter_secs(base_secs: u64) -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);

    let max_jitter = ((base_secs as f64) * JITTER_FRACTION) as u64;
    if max_jitter == 0 {
        return 0;
    }
    (nanos as u64) % max_jitter
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use wabridge_core::ChatId;

    struct FakeClient {
        connected: AtomicBool,
    }

    impl FakeClient {
        fn new() -> Self {
            Self {
                connected: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl WaClient for FakeClient {
        async fn connect(&self) -> Result<(), SessionError> {
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), SessionError> {
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn send_text(&self, _chat_id: &ChatId, _text: &str) -> Result<String, SessionError> {
            Ok("wamid.fake".to_string())
        }

        async fn send_media(
            &self,
            _chat_id: &ChatId,
            _media_url: &str,
            _content_type: &str,
            _caption: Option<&str>,
        ) -> Result<String, SessionError> {
            Ok("wamid.fake-media".to_string())
        }

        fn status(&self) -> SessionStatus {
            if self.connected.load(Ordering::SeqCst) {
                SessionStatus::Ready
            } else {
                SessionStatus::Stopped
            }
        }

        async fn fetch_media(&self, _media_url_path: &str) -> Result<Vec<u8>, SessionError> {
            Ok(b"fake-bytes".to_vec())
        }
    }

    #[tokio::test]
    async fn start_session_connects_and_rejects_duplicate() {
        let supervisor = SessionSupervisor::new();
        let session = SessionRef::new("acct1", "main");
        let client: Arc<dyn WaClient> = Arc::new(FakeClient::new());

        supervisor
            .start_session(session.clone(), client.clone())
            .await
            .unwrap();

        let again = supervisor.start_session(session.clone(), client).await;
        assert!(matches!(again, Err(SessionError::AlreadyRunning(_))));
    }

    #[tokio::test]
    async fn stop_session_disconnects() {
        let supervisor = SessionSupervisor::new();
        let session = SessionRef::new("acct1", "main");
        let client: Arc<dyn WaClient> = Arc::new(FakeClient::new());
        supervisor
            .start_session(session.clone(), client.clone())
            .await
            .unwrap();

        supervisor.stop_session(&session).await.unwrap();
        assert_eq!(client.status(), SessionStatus::Stopped);
    }

    #[tokio::test]
    async fn emit_reaches_subscribers() {
        let supervisor = SessionSupervisor::new();
        let mut rx = supervisor.subscribe();
        let session = SessionRef::new("acct1", "main");
        supervisor.emit(&session, EventKind::Stopped);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.account_id, "acct1");
        assert!(matches!(event.kind, EventKind::Stopped));
    }
}
