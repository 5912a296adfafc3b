//! Configuration types for WebHunter
//!
//! The configuration is an immutable snapshot. Components never hold a copy of
//! their fragment; they read it through a [`ConfigHandle`], which only the
//! reload path replaces, and only after every component accepted the new
//! snapshot.

use crate::error::{Error, Result};
use crate::registry::PluginName;
use crate::scheduler::{MAX_POLL_DELAY, PollInterval};
use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

/// Main WebHunter configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebHunterConfig {
    /// Server-wide settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Content sources, in registry order
    #[serde(default)]
    pub sources: PluginTable,

    /// Notification channels, in registry order
    #[serde(default, rename = "comm", alias = "comms")]
    pub comms: PluginTable,
}

impl WebHunterConfig {
    /// Parse a configuration document
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: WebHunterConfig = serde_json::from_str(text)
            .map_err(|e| Error::config(format!("Malformed configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&text)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.sources.validate("sources")?;
        self.comms.validate("comm")?;
        Ok(())
    }

    /// Names of the active sources, in registry order
    pub fn active_sources(&self) -> Vec<&str> {
        self.sources.active_names()
    }

    /// Names of the active comms, in registry order
    pub fn active_comms(&self) -> Vec<&str> {
        self.comms.active_names()
    }

    /// Configuration fragment for a source
    pub fn source_entry(&self, name: &PluginName) -> Option<&PluginEntry> {
        self.sources.get(name)
    }

    /// Configuration fragment for a comm
    pub fn comm_entry(&self, name: &PluginName) -> Option<&PluginEntry> {
        self.comms.get(name)
    }
}

/// Server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Log at debug level
    #[serde(default)]
    pub debug: bool,

    /// Compose and log notifications without delivering them
    #[serde(default)]
    pub simulate: bool,

    /// Where seen item identifiers are kept
    #[serde(default)]
    pub store: StoreConfig,

    /// Lower bound of the polling delay (in seconds)
    #[serde(default = "default_poll_time_min")]
    pub poll_time_min: u64,

    /// Upper bound of the polling delay (in seconds)
    #[serde(default = "default_poll_time_max")]
    pub poll_time_max: u64,

    /// Source whose item is preferred as the notification link
    #[serde(default)]
    pub priority_source: Option<String>,

    /// Notification wording
    #[serde(default)]
    pub message_strings: MessageStrings,
}

impl ServerConfig {
    /// Validate server settings
    pub fn validate(&self) -> Result<()> {
        if self.poll_time_min == 0 {
            return Err(Error::config("server.poll_time_min must be > 0"));
        }
        let limit = MAX_POLL_DELAY.as_secs();
        if self.poll_time_min > limit || self.poll_time_max > limit {
            return Err(Error::config(format!(
                "server.poll_time_min and server.poll_time_max must be at most {} seconds. Got: {} and {}",
                limit, self.poll_time_min, self.poll_time_max
            )));
        }
        if let Some(priority) = &self.priority_source {
            PluginName::parse(priority)?;
        }
        self.message_strings.validate()
    }

    /// Polling bounds, with `max` coerced when below `min`
    pub fn poll_interval(&self) -> PollInterval {
        PollInterval::from_secs(self.poll_time_min, self.poll_time_max)
    }

    /// Normalized priority source, if configured
    pub fn priority_source(&self) -> Option<PluginName> {
        self.priority_source
            .as_deref()
            .and_then(|name| PluginName::parse(name).ok())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            debug: false,
            simulate: false,
            store: StoreConfig::default(),
            poll_time_min: default_poll_time_min(),
            poll_time_max: default_poll_time_max(),
            priority_source: None,
            message_strings: MessageStrings::default(),
        }
    }
}

fn default_poll_time_min() -> u64 {
    240
}

fn default_poll_time_max() -> u64 {
    360
}

/// Seen store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// JSON file store
    File {
        /// Path to the store file
        path: PathBuf,
    },

    /// In-memory store (not persistent)
    Memory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::File {
            path: PathBuf::from("webhunter-seen.json"),
        }
    }
}

/// Notification wording
///
/// Body templates accept `{count}` and `{sources}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageStrings {
    pub default_title: String,
    pub default_title_plural: String,
    pub new_item_text: String,
    pub new_items_text: String,
    pub server_info_msg_title: String,
    pub server_startup_msg_text: String,
    pub server_shutdown_msg_text: String,
}

impl MessageStrings {
    fn validate(&self) -> Result<()> {
        if self.default_title.trim().is_empty() {
            return Err(Error::config(
                "server.message_strings.default_title cannot be empty",
            ));
        }
        if self.default_title_plural.trim().is_empty() {
            return Err(Error::config(
                "server.message_strings.default_title_plural cannot be empty",
            ));
        }
        Ok(())
    }

    /// Substitute `{count}` and `{sources}` in a template
    pub fn render(template: &str, count: usize, sources: &str) -> String {
        template
            .replace("{count}", &count.to_string())
            .replace("{sources}", sources)
    }
}

impl Default for MessageStrings {
    fn default() -> Self {
        Self {
            default_title: "New item found".to_string(),
            default_title_plural: "New items found".to_string(),
            new_item_text: "There is 1 new item on {sources}".to_string(),
            new_items_text: "There are {count} new items on {sources}".to_string(),
            server_info_msg_title: "WebHunter".to_string(),
            server_startup_msg_text: String::new(),
            server_shutdown_msg_text: "WebHunter stopped unexpectedly".to_string(),
        }
    }
}

/// One entry of the `sources` or `comm` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginEntry {
    /// Whether the plugin is loaded at startup
    pub active: bool,

    /// Implementation-specific settings
    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl PluginEntry {
    /// Create an active entry with the given settings
    pub fn active(settings: serde_json::Value) -> Self {
        Self {
            active: true,
            settings: match settings {
                serde_json::Value::Object(map) => map,
                _ => serde_json::Map::new(),
            },
        }
    }

    /// Deserialize the settings into a plugin's own fragment type
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(serde_json::Value::Object(self.settings.clone()))
            .map_err(|e| Error::config(format!("Invalid plugin settings: {}", e)))
    }
}

/// Ordered name -> entry table
///
/// Document order is the registry order: sources are polled and comms are
/// notified in the order they appear in the configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginTable {
    entries: Vec<(String, PluginEntry)>,
}

impl PluginTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn with(mut self, name: impl Into<String>, entry: PluginEntry) -> Self {
        self.entries.push((name.into(), entry));
        self
    }

    /// Look up an entry by normalized name
    pub fn get(&self, name: &PluginName) -> Option<&PluginEntry> {
        self.entries
            .iter()
            .find(|(key, _)| name.matches(key))
            .map(|(_, entry)| entry)
    }

    /// Iterate entries in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PluginEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Names of active entries, in order
    pub fn active_names(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, entry)| entry.active)
            .map(|(name, _)| name)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn validate(&self, table: &str) -> Result<()> {
        let mut seen = HashSet::new();
        for (key, _) in &self.entries {
            let name = PluginName::parse(key)
                .map_err(|e| Error::config(format!("{}.{}: {}", table, key, e)))?;
            if !seen.insert(name.module_path().to_string()) {
                return Err(Error::config(format!(
                    "{}.{} collides with another entry named '{}'",
                    table,
                    key,
                    name.module_path()
                )));
            }
        }
        Ok(())
    }
}

impl Serialize for PluginTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, entry) in &self.entries {
            map.serialize_entry(name, entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PluginTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = PluginTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of plugin names to plugin settings")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, entry)) = access.next_entry::<String, PluginEntry>()? {
                    entries.push((name, entry));
                }
                Ok(PluginTable { entries })
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

/// Shared, atomically replaceable configuration snapshot
///
/// Cloning the handle shares the same cell. Readers always see one whole
/// snapshot; [`ConfigHandle::current`] never observes a half-applied reload.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    cell: Arc<watch::Sender<Arc<WebHunterConfig>>>,
}

impl ConfigHandle {
    /// Wrap the startup configuration
    pub fn new(config: WebHunterConfig) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(config));
        Self { cell: Arc::new(tx) }
    }

    /// The currently accepted snapshot
    pub fn current(&self) -> Arc<WebHunterConfig> {
        self.cell.borrow().clone()
    }

    /// Commit a snapshot every component has accepted
    pub(crate) fn replace(&self, config: WebHunterConfig) -> Arc<WebHunterConfig> {
        self.cell.send_replace(Arc::new(config))
    }
}
