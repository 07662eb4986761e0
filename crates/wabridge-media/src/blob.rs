use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{MediaError, Result};

/// Pluggable storage backend for downloaded media bytes. Implementations
/// could write to local disk, S3, GCS, etc.; this crate ships only the
/// trait and an in-memory implementation for tests and small deployments.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `bytes` and return a URL/URI the chat platform or a human
    /// reader can fetch it from.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;
}

/// Default `BlobStore` used when no external backend is configured.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String> {
        self.blobs.insert(key.to_string(), bytes);
        Ok(format!("mem://{key}"))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .get(key)
            .map(|b| b.clone())
            .ok_or_else(|| MediaError::NotFound(key.to_string()))
    }
}
