// # Source Trait
//
// Defines the interface for content sources.
//
// A source knows how to list everything currently visible at one origin
// (a listing site, a feed, an API). It does not decide what is new; novelty is
// answered by the seen store, scoped to the source's identity.
//
// ## Usage
//
// ```rust,ignore
// use webhunter_core::Source;
//
// let items = source.fetch().await?;
// for item in source.filter_new(items).await? {
//     println!("new: {}", item.url);
// }
// ```

use crate::config::WebHunterConfig;
use crate::registry::PluginName;
use crate::traits::SeenStore;
use async_trait::async_trait;
use std::sync::Arc;

/// One unit of content yielded by a source
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Stable identifier, unique within the source
    pub id: String,
    /// Locator used as the notification link
    pub url: String,
    /// Human-readable title, when the origin provides one
    pub title: Option<String>,
    /// Remaining origin data
    pub data: serde_json::Value,
}

impl Item {
    /// Create an item with no title or extra data
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: None,
            data: serde_json::Value::Null,
        }
    }

    /// Attach a title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Attach origin data
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Trait for content source implementations
///
/// # Failure Isolation
///
/// A failing [`Source::fetch`] only costs this source its items for the
/// current cycle. Implementations own their timeouts; the engine does not
/// bound how long a fetch takes.
///
/// # Reload
///
/// [`Source::reload`] only validates. When every component accepts, the
/// engine commits the snapshot to the shared [`crate::ConfigHandle`], and the
/// source reads its new fragment from there on its next call. A rejection
/// therefore never leaves this source, or any other, on the new values.
#[async_trait]
pub trait Source: Send + Sync {
    /// Normalized name; its type name is the source identity
    fn name(&self) -> &PluginName;

    /// Shared seen store
    fn seen_store(&self) -> &Arc<dyn SeenStore>;

    /// Everything currently visible at the origin (not a delta)
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<Item>)`: the current items
    /// - `Err(Error::Fetch)`: network, parse or rate-limit failure
    async fn fetch(&self) -> Result<Vec<Item>, crate::Error>;

    /// Whether the item has not been reported before; records it if so
    ///
    /// Pure delegation to the seen store under this source's identity.
    async fn is_new(&self, item: &Item) -> Result<bool, crate::Error> {
        self.seen_store()
            .check_and_mark(self.name().type_name(), &item.id)
            .await
    }

    /// The items of one fetch that were not reported before; records them
    ///
    /// Same decision as [`Source::is_new`] per item, made for the whole
    /// batch at once: either every novel item is recorded and returned, or
    /// the call fails and none is recorded.
    async fn filter_new(&self, items: Vec<Item>) -> Result<Vec<Item>, crate::Error> {
        let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
        let flags = self
            .seen_store()
            .check_and_mark_many(self.name().type_name(), &ids)
            .await?;
        Ok(items
            .into_iter()
            .zip(flags)
            .filter_map(|(item, novel)| novel.then_some(item))
            .collect())
    }

    /// Validate this source's fragment of a new snapshot
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: the fragment is acceptable
    /// - `Ok(false)`: the fragment parses but is invalid; keep the current one
    /// - `Err(Error)`: the snapshot is structurally unexpected
    fn reload(&self, config: &WebHunterConfig) -> Result<bool, crate::Error>;
}

/// Everything a factory needs to build a source
#[derive(Clone)]
pub struct SourceContext {
    /// Normalized name from the configuration key
    pub name: PluginName,
    /// Shared configuration snapshot
    pub config: crate::config::ConfigHandle,
    /// Shared seen store
    pub store: Arc<dyn SeenStore>,
}

/// Helper trait for constructing sources from configuration
pub trait SourceFactory: Send + Sync {
    /// Create a Source instance
    ///
    /// The current snapshot must already hold a valid fragment for
    /// `context.name`; otherwise return `Error::Config`.
    fn create(&self, context: SourceContext) -> Result<Box<dyn Source>, crate::Error>;
}
