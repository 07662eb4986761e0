use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{routing::get, Router};
use wabridge_buffer::BufferManager;
use wabridge_core::config::AppConfig;
use wabridge_media::{InMemoryBlobStore, MediaCache};
use wabridge_policy::PolicyCache;
use wabridge_rbac::AclHub;
use wabridge_registry::SessionRegistry;
use wabridge_sessions::SessionSupervisor;
use wabridge_store::Store;

/// Hard cap on simultaneous WS connections.
pub const MAX_WS_CONNECTIONS: usize = 2_000;

/// Central shared state — passed as `Arc<AppState>` to every Axum handler.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<Store>,
    pub sessions: Arc<SessionSupervisor>,
    pub registry: Arc<SessionRegistry>,
    pub acl: Arc<AclHub>,
    pub policy: Arc<PolicyCache>,
    pub media: Arc<MediaCache>,
    pub buffer: Arc<BufferManager>,
    pub ws_connections: AtomicUsize,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<Store>) -> Self {
        let sessions = Arc::new(SessionSupervisor::new());
        let registry = Arc::new(SessionRegistry::new(store.clone()));
        let acl = Arc::new(AclHub::new(store.clone()));
        let policy = Arc::new(PolicyCache::new(store.clone()));
        let media = Arc::new(MediaCache::new(Arc::new(InMemoryBlobStore::new())));
        let buffer_config = wabridge_buffer::BufferConfig {
            debounce_ms: config.buffer.debounce_ms,
            hard_cap_ms: config.buffer.hard_cap_ms,
            gc_idle_ms: config.buffer.gc_idle_ms,
            finalizer_words: config.buffer.finalizer_words.clone(),
            explicit_voice_words: config.buffer.explicit_voice_words.clone(),
            explicit_text_words: config.buffer.explicit_text_words.clone(),
        };
        let buffer = Arc::new(BufferManager::new(
            store.clone(),
            policy.clone(),
            media.clone(),
            buffer_config,
        ));

        Self {
            config,
            store,
            sessions,
            registry,
            acl,
            policy,
            media,
            buffer,
            ws_connections: AtomicUsize::new(0),
        }
    }

    /// Try to reserve a connection slot; `false` means the cap is full.
    pub fn try_acquire_connection(&self) -> bool {
        loop {
            let current = self.ws_connections.load(Ordering::SeqCst);
            if current >= MAX_WS_CONNECTIONS {
                return false;
            }
            if self
                .ws_connections
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }

    pub fn release_connection(&self) {
        self.ws_connections.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/ws", get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
