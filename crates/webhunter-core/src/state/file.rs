// # File Seen Store
//
// File-based implementation of SeenStore with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename
// - Corruption detection: JSON validated on load
// - Backup: `.backup` holds the previous good file
// - Recovery: falls back to the backup if the main file is corrupted
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "sources": {
//     "JsonFeed": {
//       "listing-1234": { "first_seen": "2025-01-09T12:00:00Z" }
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::seen_store::{SeenRecord, SeenStore};

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

/// source identity -> item id -> record
type SeenMap = HashMap<String, HashMap<String, SeenRecord>>;

/// File-based seen store with crash recovery
///
/// Every successful mark is written to disk before the call returns, one
/// write per batch. The write lock is held across the write, so marks are
/// serialized and a `check_and_mark` race on the same identifier cannot
/// report "new" twice. A failed write rolls the batch back in memory.
///
/// # Example
///
/// ```rust,no_run
/// use webhunter_core::state::FileSeenStore;
/// use webhunter_core::SeenStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileSeenStore::new("/var/lib/webhunter/seen.json").await?;
///
///     assert!(store.check_and_mark("JsonFeed", "listing-1").await?);
///     assert!(!store.check_and_mark("JsonFeed", "listing-1").await?);
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileSeenStore {
    path: PathBuf,
    sources: RwLock<SeenMap>,
}

/// Store file format, as read
#[derive(Debug, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    sources: SeenMap,
}

/// Store file format, as written from the live map
#[derive(serde::Serialize)]
struct StoreFileRef<'a> {
    version: &'a str,
    sources: &'a SeenMap,
}

/// Result of reading one store file
enum LoadOutcome {
    Loaded(SeenMap),
    Corrupt(String),
}

impl FileSeenStore {
    /// Create or load a file seen store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Load the existing file
    /// 3. If it is corrupted, load the backup and restore it
    /// 4. If both are unusable, start empty
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::storage(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let sources = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            sources: RwLock::new(sources),
        })
    }

    /// Path of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_with_recovery(path: &Path) -> Result<SeenMap, Error> {
        let reason = match Self::load(path).await? {
            LoadOutcome::Loaded(sources) => {
                tracing::debug!(
                    "Loaded seen store: {} source(s), {} item(s)",
                    sources.len(),
                    sources.values().map(HashMap::len).sum::<usize>()
                );
                return Ok(sources);
            }
            LoadOutcome::Corrupt(reason) => reason,
        };

        tracing::warn!(
            "Seen store {} appears corrupted: {}. Attempting recovery from backup.",
            path.display(),
            reason
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with empty seen store.");
            return Ok(SeenMap::new());
        }

        match Self::load(&backup_path).await? {
            LoadOutcome::Loaded(sources) => {
                tracing::info!("Recovered seen store from backup: {} source(s)", sources.len());
                if let Err(e) = fs::copy(&backup_path, path).await {
                    tracing::error!("Failed to restore seen store from backup: {}", e);
                }
                Ok(sources)
            }
            LoadOutcome::Corrupt(backup_reason) => {
                tracing::error!(
                    "Backup also corrupted: {}. Starting with empty seen store.",
                    backup_reason
                );
                Ok(SeenMap::new())
            }
        }
    }

    async fn load(path: &Path) -> Result<LoadOutcome, Error> {
        if !path.exists() {
            tracing::debug!("Seen store does not exist yet: {}", path.display());
            return Ok(LoadOutcome::Loaded(SeenMap::new()));
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::storage(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let file: StoreFileFormat = match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(e) => return Ok(LoadOutcome::Corrupt(e.to_string())),
        };

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Seen store version mismatch: expected {}, got {}. Loading anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        Ok(LoadOutcome::Loaded(file.sources))
    }

    /// Write the given state atomically
    ///
    /// Callers hold the write guard that `sources` was borrowed from.
    async fn persist(&self, sources: &SeenMap) -> Result<(), Error> {
        let file = StoreFileRef {
            version: STORE_FILE_VERSION,
            sources,
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::storage(format!("Failed to serialize seen store: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut out = fs::File::create(&temp_path).await.map_err(|e| {
                Error::storage(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            out.write_all(json.as_bytes()).await.map_err(|e| {
                Error::storage(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            out.sync_all().await.map_err(|e| {
                Error::storage(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists()
            && let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await
        {
            tracing::warn!("Failed to create seen store backup: {}", e);
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::storage(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Seen store written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl SeenStore for FileSeenStore {
    async fn check_and_mark(&self, source_id: &str, item_id: &str) -> Result<bool, Error> {
        let flags = self
            .check_and_mark_many(source_id, &[item_id.to_string()])
            .await?;
        Ok(flags.first().copied().unwrap_or(false))
    }

    async fn check_and_mark_many(
        &self,
        source_id: &str,
        item_ids: &[String],
    ) -> Result<Vec<bool>, Error> {
        let mut guard = self.sources.write().await;

        let items = guard.entry(source_id.to_string()).or_default();
        let flags: Vec<bool> = item_ids
            .iter()
            .map(|id| {
                if items.contains_key(id.as_str()) {
                    return false;
                }
                items.insert(id.clone(), SeenRecord::now());
                true
            })
            .collect();
        if !flags.contains(&true) {
            return Ok(flags);
        }

        if let Err(e) = self.persist(&guard).await {
            // Not durable, so not seen
            if let Some(items) = guard.get_mut(source_id) {
                for (id, _) in item_ids.iter().zip(&flags).filter(|(_, added)| **added) {
                    items.remove(id.as_str());
                }
            }
            return Err(e);
        }

        Ok(flags)
    }

    async fn is_seen(&self, source_id: &str, item_id: &str) -> Result<bool, Error> {
        let guard = self.sources.read().await;
        Ok(guard
            .get(source_id)
            .is_some_and(|items| items.contains_key(item_id)))
    }

    async fn mark_seen(&self, source_id: &str, item_id: &str) -> Result<(), Error> {
        self.mark_seen_many(source_id, &[item_id.to_string()])
            .await
            .map(|_| ())
    }

    async fn mark_seen_many(&self, source_id: &str, item_ids: &[String]) -> Result<usize, Error> {
        let flags = self.check_and_mark_many(source_id, item_ids).await?;
        Ok(flags.into_iter().filter(|added| *added).count())
    }

    async fn count(&self, source_id: &str) -> Result<usize, Error> {
        let guard = self.sources.read().await;
        Ok(guard.get(source_id).map_or(0, HashMap::len))
    }

    async fn flush(&self) -> Result<(), Error> {
        // Every mark is persisted before it returns
        Ok(())
    }
}
