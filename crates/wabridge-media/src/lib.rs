pub mod blob;
pub mod cache;
pub mod error;

pub use blob::{BlobStore, InMemoryBlobStore};
pub use cache::{spawn_sweeper, MediaCache, MEDIA_SWEEP_INTERVAL_SECS, MEDIA_TTL_SECS};
pub use error::MediaError;
