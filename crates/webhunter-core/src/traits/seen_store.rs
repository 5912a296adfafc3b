// # Seen Store Trait
//
// Defines the interface for the deduplication store.
//
// ## Purpose
//
// The seen store remembers which item identifiers each source has already
// reported, so that an item triggers at most one notification, including
// across process restarts.
//
// ## Keys
//
// Records are keyed by (source identity, item identifier). Sources never see
// each other's keys.
//
// ## Implementations
//
// - File-based: JSON file with atomic replace and backup (`FileSeenStore`)
// - In-memory: for tests and throwaway runs (`MemorySeenStore`)

use async_trait::async_trait;

/// A recorded sighting of an item
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SeenRecord {
    /// When the item was first observed
    pub first_seen: chrono::DateTime<chrono::Utc>,
}

impl SeenRecord {
    pub(crate) fn now() -> Self {
        Self {
            first_seen: chrono::Utc::now(),
        }
    }
}

/// Trait for seen store implementations
///
/// # Atomicity
///
/// [`SeenStore::check_and_mark`] is a single check-and-set: two concurrent
/// calls for the same (source, item) pair never both return `true`. Calls for
/// different sources touch disjoint keys.
///
/// # Durability
///
/// When `check_and_mark` or `mark_seen` returns, the record must be durable
/// for persistent implementations. A record is never removed by normal
/// operation.
#[async_trait]
pub trait SeenStore: Send + Sync {
    /// Record an item and report whether it was new
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: first observation; the item is now recorded
    /// - `Ok(false)`: the item was already recorded
    /// - `Err(Error::Storage)`: the store is unavailable
    async fn check_and_mark(&self, source_id: &str, item_id: &str) -> Result<bool, crate::Error>;

    /// Record a batch of one source's items in a single write
    ///
    /// All or nothing: on error no identifier of the batch is recorded, so
    /// every one of them is reported again by a later call. An identifier
    /// repeated within the batch is new at most once.
    ///
    /// # Returns
    ///
    /// One flag per identifier, in input order: `true` where the identifier
    /// was recorded by this call.
    async fn check_and_mark_many(
        &self,
        source_id: &str,
        item_ids: &[String],
    ) -> Result<Vec<bool>, crate::Error>;

    /// Point lookup without marking
    async fn is_seen(&self, source_id: &str, item_id: &str) -> Result<bool, crate::Error>;

    /// Record an item without querying it
    async fn mark_seen(&self, source_id: &str, item_id: &str) -> Result<(), crate::Error>;

    /// Record many items of one source in a single write
    ///
    /// # Returns
    ///
    /// The number of identifiers that were not recorded before.
    async fn mark_seen_many(
        &self,
        source_id: &str,
        item_ids: &[String],
    ) -> Result<usize, crate::Error>;

    /// Number of recorded items for a source
    async fn count(&self, source_id: &str) -> Result<usize, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
