// # Memory Seen Store
//
// In-memory implementation of SeenStore.
//
// Nothing survives a restart: the first cycle after a restart reports every
// item as new. Useful for tests and for dry runs combined with `simulate`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::seen_store::{SeenRecord, SeenStore};

/// In-memory seen store implementation
///
/// Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemorySeenStore {
    inner: Arc<RwLock<HashMap<String, HashMap<String, SeenRecord>>>>,
}

impl MemorySeenStore {
    /// Create a new empty memory seen store
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all sources
    pub async fn len(&self) -> usize {
        self.inner.read().await.values().map(HashMap::len).sum()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// First-seen record of an item
    pub async fn record(&self, source_id: &str, item_id: &str) -> Option<SeenRecord> {
        let guard = self.inner.read().await;
        guard.get(source_id)?.get(item_id).cloned()
    }
}

#[async_trait]
impl SeenStore for MemorySeenStore {
    async fn check_and_mark(&self, source_id: &str, item_id: &str) -> Result<bool, Error> {
        let mut guard = self.inner.write().await;
        let items = guard.entry(source_id.to_string()).or_default();
        if items.contains_key(item_id) {
            return Ok(false);
        }
        items.insert(item_id.to_string(), SeenRecord::now());
        Ok(true)
    }

    async fn check_and_mark_many(
        &self,
        source_id: &str,
        item_ids: &[String],
    ) -> Result<Vec<bool>, Error> {
        let mut guard = self.inner.write().await;
        let items = guard.entry(source_id.to_string()).or_default();
        Ok(item_ids
            .iter()
            .map(|id| {
                if items.contains_key(id) {
                    return false;
                }
                items.insert(id.clone(), SeenRecord::now());
                true
            })
            .collect())
    }

    async fn is_seen(&self, source_id: &str, item_id: &str) -> Result<bool, Error> {
        let guard = self.inner.read().await;
        Ok(guard
            .get(source_id)
            .is_some_and(|items| items.contains_key(item_id)))
    }

    async fn mark_seen(&self, source_id: &str, item_id: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard
            .entry(source_id.to_string())
            .or_default()
            .entry(item_id.to_string())
            .or_insert_with(SeenRecord::now);
        Ok(())
    }

    async fn mark_seen_many(&self, source_id: &str, item_ids: &[String]) -> Result<usize, Error> {
        let flags = self.check_and_mark_many(source_id, item_ids).await?;
        Ok(flags.into_iter().filter(|added| *added).count())
    }

    async fn count(&self, source_id: &str) -> Result<usize, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(source_id).map_or(0, HashMap::len))
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}
