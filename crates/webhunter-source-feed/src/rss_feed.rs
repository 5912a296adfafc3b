// # RSS Feed Source
//
// Lists the items of an RSS 2.0 channel. An item is identified by its
// <guid>, falling back to its <link>; items with neither are skipped.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use webhunter_core::registry::settings::{checked_settings, review_reload, settings_for, url_problem};
use webhunter_core::{
    ConfigHandle, Error, Item, PluginKind, PluginName, PluginSettings, Result, SeenStore, Source,
    SourceContext, SourceFactory, WebHunterConfig,
};

use crate::{get, http_client};

/// `rss_feed` configuration fragment
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RssFeedSettings {
    /// Channel URL
    pub url: String,

    /// Per-request timeout in seconds
    #[serde(default = "crate::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl PluginSettings for RssFeedSettings {
    fn problem(&self) -> Option<String> {
        if let Some(problem) = url_problem(&self.url) {
            return Some(problem);
        }
        if self.timeout_secs == 0 {
            return Some("timeout_secs must be > 0".to_string());
        }
        None
    }
}

/// RSS channel source
pub struct RssFeedSource {
    name: PluginName,
    config: ConfigHandle,
    store: Arc<dyn SeenStore>,
    client: reqwest::Client,
}

impl RssFeedSource {
    /// Items of an already-fetched channel
    ///
    /// Items without a link point at the channel itself.
    pub fn parse_channel(channel: &rss::Channel) -> Vec<Item> {
        channel
            .items()
            .iter()
            .filter_map(|entry| {
                let id = entry
                    .guid()
                    .map(|guid| guid.value().to_string())
                    .filter(|id| !id.is_empty())
                    .or_else(|| entry.link().map(String::from))?;

                let url = entry.link().unwrap_or(channel.link()).to_string();
                let data = serde_json::json!({
                    "description": entry.description(),
                    "pub_date": entry.pub_date(),
                });

                let mut item = Item::new(id, url).with_data(data);
                if let Some(title) = entry.title() {
                    item = item.with_title(title);
                }
                Some(item)
            })
            .collect()
    }
}

#[async_trait]
impl Source for RssFeedSource {
    fn name(&self) -> &PluginName {
        &self.name
    }

    fn seen_store(&self) -> &Arc<dyn SeenStore> {
        &self.store
    }

    async fn fetch(&self) -> Result<Vec<Item>> {
        let settings: RssFeedSettings = settings_for(
            &self.config.current(),
            PluginKind::Source,
            &self.name,
        )?;

        let response = get(&self.client, &self.name, &settings.url, settings.timeout_secs).await?;
        let body = response.bytes().await.map_err(|e| {
            Error::fetch(self.name.type_name(), format!("Failed to read response: {}", e))
        })?;
        let channel = rss::Channel::read_from(&body[..]).map_err(|e| {
            Error::fetch(self.name.type_name(), format!("Invalid RSS document: {}", e))
        })?;

        let items = Self::parse_channel(&channel);
        tracing::debug!(source = %self.name, "Listed {} item(s)", items.len());
        Ok(items)
    }

    fn reload(&self, config: &WebHunterConfig) -> Result<bool> {
        review_reload::<RssFeedSettings>(config, PluginKind::Source, &self.name)
    }
}

/// Factory for `rss_feed` sources
pub struct RssFeedFactory;

impl SourceFactory for RssFeedFactory {
    fn create(&self, context: SourceContext) -> Result<Box<dyn Source>> {
        checked_settings::<RssFeedSettings>(
            &context.config.current(),
            PluginKind::Source,
            &context.name,
        )?;

        Ok(Box::new(RssFeedSource {
            name: context.name,
            config: context.config,
            store: context.store,
            client: http_client()?,
        }))
    }
}
