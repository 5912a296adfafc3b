// # Seen Store Implementations
//
// This module provides implementations of the SeenStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::FileSeenStore;
pub use memory::MemorySeenStore;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::traits::SeenStore;
use std::sync::Arc;

/// Open the seen store described by the configuration
///
/// An unreachable store is a startup failure; the caller decides the exit code.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn SeenStore>> {
    match config {
        StoreConfig::File { path } => {
            tracing::info!("Opening seen store at {}", path.display());
            Ok(Arc::new(FileSeenStore::new(path).await?))
        }
        StoreConfig::Memory => {
            tracing::warn!("Using in-memory seen store; seen items are forgotten on restart");
            Ok(Arc::new(MemorySeenStore::new()))
        }
    }
}
