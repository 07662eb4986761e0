use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;
use wabridge_core::now_millis;

use crate::blob::BlobStore;
use crate::error::Result;

/// MediaCache entry lifetime (15 minutes).
pub const MEDIA_TTL_SECS: u64 = 15 * 60;
/// MediaCache sweep cadence.
pub const MEDIA_SWEEP_INTERVAL_SECS: u64 = 60;

struct Entry {
    url: String,
    cached_at: i64,
}

/// Caches the blob-store URL a downloaded attachment resolved to, keyed by
/// the platform's own media id, so a repeated reference to the same inbound
/// attachment within the TTL window skips the download+store round trip.
/// Grounded in `MemoryManager`'s cached-context-with-TTL pattern, generalized
/// from a single `HashMap` + on-read check to a `DashMap` plus a periodic
/// background sweep (this cache is read far more concurrently than it's
/// written).
pub struct MediaCache {
    entries: DashMap<String, Entry>,
    ttl_secs: u64,
    store: Arc<dyn BlobStore>,
}

impl MediaCache {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl_secs: MEDIA_TTL_SECS,
            store,
        }
    }

    pub fn with_ttl_secs(store: Arc<dyn BlobStore>, ttl_secs: u64) -> Self {
        Self {
            entries: DashMap::new(),
            ttl_secs,
            store,
        }
    }

    pub fn get(&self, media_id: &str) -> Option<String> {
        let entry = self.entries.get(media_id)?;
        if self.is_fresh(entry.cached_at) {
            Some(entry.url.clone())
        } else {
            None
        }
    }

    /// Download `bytes` into the blob store under `media_id` unless a fresh
    /// cached URL already exists, returning the resolved URL either way.
    pub async fn resolve(
        &self,
        media_id: &str,
        bytes: impl FnOnce() -> Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        if let Some(url) = self.get(media_id) {
            return Ok(url);
        }
        let url = self.store.put(media_id, bytes(), content_type).await?;
        self.entries.insert(
            media_id.to_string(),
            Entry {
                url: url.clone(),
                cached_at: now_millis(),
            },
        );
        Ok(url)
    }

    fn is_fresh(&self, cached_at: i64) -> bool {
        let age_ms = now_millis().saturating_sub(cached_at);
        age_ms < (self.ttl_secs as i64) * 1000
    }

    /// Remove every entry older than the configured TTL.
    pub fn sweep(&self) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| self.is_fresh(entry.cached_at));
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "media cache sweep evicted expired entries");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Spawns a background task that sweeps `cache` every [`MEDIA_SWEEP_INTERVAL_SECS`].
pub fn spawn_sweeper(cache: Arc<MediaCache>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(MEDIA_SWEEP_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            cache.sweep();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::InMemoryBlobStore;

    #[tokio::test]
    async fn resolve_caches_result() {
        let store = Arc::new(InMemoryBlobStore::new());
        let cache = MediaCache::new(store);

        let url1 = cache
            .resolve("msg1", || b"hello".to_vec(), "audio/ogg")
            .await
            .unwrap();
        let url2 = cache
            .resolve("msg1", || panic!("should not redownload"), "audio/ogg")
            .await
            .unwrap();
        assert_eq!(url1, url2);
    }

    #[tokio::test]
    async fn expired_entry_is_not_fresh() {
        let store = Arc::new(InMemoryBlobStore::new());
        let cache = MediaCache::with_ttl_secs(store, 0);
        cache
            .resolve("msg2", || b"bytes".to_vec(), "image/jpeg")
            .await
            .unwrap();
        // ttl of 0 means every entry is immediately stale
        assert!(cache.get("msg2").is_none());
    }

    #[test]
    fn sweep_removes_stale_entries() {
        let cache = MediaCache::with_ttl_secs(Arc::new(InMemoryBlobStore::new()), 0);
        cache.entries.insert(
            "old".to_string(),
            Entry {
                url: "mem://old".to_string(),
                cached_at: 0,
            },
        );
        cache.sweep();
        assert!(cache.is_empty());
    }
}
