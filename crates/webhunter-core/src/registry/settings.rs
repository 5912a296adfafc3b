// # Plugin Settings
//
// Helpers shared by plugin crates for reading and reviewing their
// configuration fragment.
//
// A plugin describes its fragment as a `PluginSettings` type. The same type
// serves three moments:
//
// - factory time: `checked_settings` refuses an invalid fragment (fatal at startup)
// - reload time: `review_reload` answers the plugin's verdict
// - call time: `settings_for` reads the fragment of the current snapshot

use crate::config::{PluginEntry, WebHunterConfig};
use crate::error::{Error, PluginKind, Result};
use crate::registry::PluginName;
use serde::de::DeserializeOwned;

/// User agent for outbound plugin requests
pub const USER_AGENT: &str = concat!("webhunter/", env!("CARGO_PKG_VERSION"));

/// A plugin's configuration fragment
pub trait PluginSettings: DeserializeOwned {
    /// Why the settings cannot be used, if they cannot
    fn problem(&self) -> Option<String>;
}

fn entry_for<'a>(
    config: &'a WebHunterConfig,
    kind: PluginKind,
    name: &PluginName,
) -> Option<&'a PluginEntry> {
    match kind {
        PluginKind::Source => config.source_entry(name),
        PluginKind::Comm => config.comm_entry(name),
    }
}

/// Read and deserialize a plugin's fragment from a snapshot
pub fn settings_for<T: PluginSettings>(
    config: &WebHunterConfig,
    kind: PluginKind,
    name: &PluginName,
) -> Result<T> {
    entry_for(config, kind, name)
        .ok_or_else(|| Error::config(format!("No configuration for {} {}", kind, name)))?
        .parse()
}

/// Settings from a snapshot, refused if invalid
pub fn checked_settings<T: PluginSettings>(
    config: &WebHunterConfig,
    kind: PluginKind,
    name: &PluginName,
) -> Result<T> {
    let settings: T = settings_for(config, kind, name)?;
    if let Some(problem) = settings.problem() {
        return Err(Error::config(format!("{} {}: {}", kind, name, problem)));
    }
    Ok(settings)
}

/// A plugin's verdict on its fragment of a new snapshot
///
/// # Returns
///
/// - `Ok(true)`: the fragment parses and is valid
/// - `Ok(false)`: the fragment parses but is invalid
/// - `Err(Error::Config)`: the fragment is missing or does not parse
pub fn review_reload<T: PluginSettings>(
    config: &WebHunterConfig,
    kind: PluginKind,
    name: &PluginName,
) -> Result<bool> {
    let settings: T = settings_for(config, kind, name)?;
    match settings.problem() {
        Some(problem) => {
            tracing::warn!(plugin = %name, "{} rejects new configuration: {}", kind, problem);
            Ok(false)
        }
        None => Ok(true),
    }
}

/// Reject anything but an absolute http(s) URL
pub fn url_problem(url: &str) -> Option<String> {
    if url.trim().is_empty() {
        return Some("url cannot be empty".to_string());
    }
    if !url.starts_with("https://") && !url.starts_with("http://") {
        return Some(format!("url must use HTTP or HTTPS scheme. Got: {}", url));
    }
    None
}
