//! Item persistence.
//!
//! The pipeline only ever looks items up by GUID, inserts new ones and reads
//! the latest items of a source. There is no update or delete.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use crate::error::StoreError;
use crate::ingest::types::Item;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Items kept per feed document unless configured otherwise.
pub const DEFAULT_FEED_LIMIT: usize = 20;

#[async_trait::async_trait]
pub trait ItemStore: Send + Sync {
    /// Idempotently provision the indexes on guid, source and seen (descending).
    async fn ensure_indexes(&self) -> Result<(), StoreError>;

    /// `Ok(None)` when no item carries this GUID.
    async fn find_by_guid(&self, guid: &str) -> Result<Option<Item>, StoreError>;

    async fn insert(&self, item: &Item) -> Result<(), StoreError>;

    /// At most `limit` items of `source`, newest first.
    async fn latest_by_source(&self, source: &str, limit: usize) -> Result<Vec<Item>, StoreError>;
}

/// Open the store named by `url`.
///
/// - `memory:` keeps items in process memory only.
/// - `sqlite:...` opens (or creates) an SQLite database.
pub async fn connect(url: &str) -> Result<Arc<dyn ItemStore>, StoreError> {
    if url == "memory:" {
        return Ok(Arc::new(MemoryStore::new()));
    }
    if url.starts_with("sqlite:") {
        let store = SqliteStore::connect(url).await?;
        return Ok(Arc::new(store));
    }
    Err(StoreError::UnsupportedUrl(url.to_string()))
}
