use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::StoreError;
use crate::ingest::types::Item;

use super::ItemStore;

/// In-process store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    items: Vec<Item>,
    by_guid: HashMap<String, usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("memory store mutex poisoned").items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl ItemStore for MemoryStore {
    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_by_guid(&self, guid: &str) -> Result<Option<Item>, StoreError> {
        let inner = self.inner.lock().expect("memory store mutex poisoned");
        Ok(inner.by_guid.get(guid).map(|&i| inner.items[i].clone()))
    }

    async fn insert(&self, item: &Item) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("memory store mutex poisoned");
        if inner.by_guid.contains_key(&item.guid) {
            return Err(StoreError::Duplicate(item.guid.clone()));
        }
        let idx = inner.items.len();
        inner.by_guid.insert(item.guid.clone(), idx);
        inner.items.push(item.clone());
        Ok(())
    }

    async fn latest_by_source(&self, source: &str, limit: usize) -> Result<Vec<Item>, StoreError> {
        let inner = self.inner.lock().expect("memory store mutex poisoned");
        let mut out: Vec<Item> = inner
            .items
            .iter()
            .filter(|it| it.source == source)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.seen_ms.cmp(&a.seen_ms));
        out.truncate(limit);
        Ok(out)
    }
}
