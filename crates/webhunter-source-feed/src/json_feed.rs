// # JSON Feed Source
//
// Lists items from an HTTP endpoint returning JSON. The listing array is
// found with a JSON pointer (RFC 6901); each element supplies an id and a
// link through configurable field names. Numeric ids are accepted and
// compared as their decimal text.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use webhunter_core::registry::settings::{checked_settings, review_reload, settings_for, url_problem};
use webhunter_core::{
    ConfigHandle, Error, Item, PluginKind, PluginName, PluginSettings, Result, SeenStore, Source,
    SourceContext, SourceFactory, WebHunterConfig,
};

use crate::{get, http_client};

/// `json_feed` configuration fragment
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JsonFeedSettings {
    /// Endpoint to GET
    pub url: String,

    /// JSON pointer to the listing array; the document root when absent
    #[serde(default)]
    pub items_pointer: Option<String>,

    /// Field holding the item id
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Field holding the item link
    #[serde(default = "default_url_field")]
    pub url_field: String,

    /// Field holding a human-readable title
    #[serde(default)]
    pub title_field: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "crate::default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_id_field() -> String {
    "id".to_string()
}

fn default_url_field() -> String {
    "url".to_string()
}

impl PluginSettings for JsonFeedSettings {
    fn problem(&self) -> Option<String> {
        if let Some(problem) = url_problem(&self.url) {
            return Some(problem);
        }
        if self.timeout_secs == 0 {
            return Some("timeout_secs must be > 0".to_string());
        }
        if self.id_field.is_empty() || self.url_field.is_empty() {
            return Some("id_field and url_field cannot be empty".to_string());
        }
        if let Some(pointer) = &self.items_pointer
            && !pointer.is_empty()
            && !pointer.starts_with('/')
        {
            return Some(format!("items_pointer must start with '/'. Got: {}", pointer));
        }
        None
    }
}

impl JsonFeedSettings {
    /// Turn a response document into items
    ///
    /// Elements without a usable id or link are skipped.
    pub fn extract_items(&self, document: &Value) -> std::result::Result<Vec<Item>, String> {
        let listing = match self.items_pointer.as_deref() {
            Some(pointer) if !pointer.is_empty() => document
                .pointer(pointer)
                .ok_or_else(|| format!("Nothing at items_pointer {}", pointer))?,
            _ => document,
        };

        let entries = listing
            .as_array()
            .ok_or_else(|| "Expected a JSON array of items".to_string())?;

        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            let (Some(id), Some(url)) = (
                text_field(entry, &self.id_field),
                text_field(entry, &self.url_field),
            ) else {
                tracing::debug!("Skipping listing without {} or {}", self.id_field, self.url_field);
                continue;
            };

            let mut item = Item::new(id, url).with_data(entry.clone());
            if let Some(title) = self
                .title_field
                .as_deref()
                .and_then(|field| text_field(entry, field))
            {
                item = item.with_title(title);
            }
            items.push(item);
        }
        Ok(items)
    }
}

/// A string or number field, as text
fn text_field(entry: &Value, field: &str) -> Option<String> {
    match entry.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// JSON endpoint source
pub struct JsonFeedSource {
    name: PluginName,
    config: ConfigHandle,
    store: Arc<dyn SeenStore>,
    client: reqwest::Client,
}

#[async_trait]
impl Source for JsonFeedSource {
    fn name(&self) -> &PluginName {
        &self.name
    }

    fn seen_store(&self) -> &Arc<dyn SeenStore> {
        &self.store
    }

    async fn fetch(&self) -> Result<Vec<Item>> {
        let settings: JsonFeedSettings = settings_for(
            &self.config.current(),
            PluginKind::Source,
            &self.name,
        )?;

        let response = get(&self.client, &self.name, &settings.url, settings.timeout_secs).await?;
        let document: Value = response.json().await.map_err(|e| {
            Error::fetch(self.name.type_name(), format!("Failed to parse response: {}", e))
        })?;

        let items = settings
            .extract_items(&document)
            .map_err(|msg| Error::fetch(self.name.type_name(), msg))?;
        tracing::debug!(source = %self.name, "Listed {} item(s)", items.len());
        Ok(items)
    }

    fn reload(&self, config: &WebHunterConfig) -> Result<bool> {
        review_reload::<JsonFeedSettings>(config, PluginKind::Source, &self.name)
    }
}

/// Factory for `json_feed` sources
pub struct JsonFeedFactory;

impl SourceFactory for JsonFeedFactory {
    fn create(&self, context: SourceContext) -> Result<Box<dyn Source>> {
        checked_settings::<JsonFeedSettings>(
            &context.config.current(),
            PluginKind::Source,
            &context.name,
        )?;

        Ok(Box::new(JsonFeedSource {
            name: context.name,
            config: context.config,
            store: context.store,
            client: http_client()?,
        }))
    }
}
