// # Feed Sources
//
// This crate provides HTTP feed sources for WebHunter:
//
// - `json_feed`: any HTTP endpoint returning a JSON array of listings
// - `rss_feed`: an RSS 2.0 channel
//
// ## Architecture
//
// Sources are stateless between calls. Each `fetch()` reads the source's
// current fragment from the shared configuration snapshot, performs one GET
// with the configured timeout, and returns everything the origin lists.
// Novelty is decided by the seen store, never here.
//
// ## Configuration
//
// ```json
// "sources": {
//     "json_feed": {
//         "active": true,
//         "url": "https://listings.example/api/new",
//         "items_pointer": "/results",
//         "id_field": "id",
//         "url_field": "url",
//         "title_field": "address"
//     },
//     "rss_feed": { "active": true, "url": "https://blog.example/feed.xml" }
// }
// ```

mod json_feed;
mod rss_feed;

pub use json_feed::{JsonFeedFactory, JsonFeedSettings, JsonFeedSource};
pub use rss_feed::{RssFeedFactory, RssFeedSettings, RssFeedSource};

use std::time::Duration;
use webhunter_core::registry::settings::USER_AGENT;
use webhunter_core::{Error, PluginName, PluginRegistry, Result};

/// Default per-request timeout
const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Register the feed sources with a registry
///
/// # Example
///
/// ```rust
/// use webhunter_core::PluginRegistry;
///
/// let mut registry = PluginRegistry::new();
/// webhunter_source_feed::register(&mut registry).unwrap();
/// assert!(registry.has_source("JsonFeed"));
/// ```
pub fn register(registry: &mut PluginRegistry) -> Result<()> {
    registry.register_source("json_feed", Box::new(JsonFeedFactory))?;
    registry.register_source("rss_feed", Box::new(RssFeedFactory))?;
    Ok(())
}

pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))
}

/// One GET, mapping transport and status failures to fetch errors
pub(crate) async fn get(
    client: &reqwest::Client,
    name: &PluginName,
    url: &str,
    timeout_secs: u64,
) -> Result<reqwest::Response> {
    let source = name.type_name();
    tracing::debug!(source = %source, "GET {}", url);

    let response = client
        .get(url)
        .timeout(Duration::from_secs(timeout_secs))
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                Error::fetch(source, format!("Request timed out after {}s", timeout_secs))
            } else {
                Error::fetch(source, format!("HTTP request failed: {}", e))
            }
        })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    Err(match status.as_u16() {
        429 => Error::fetch(source, format!("Rate limited by origin. Status: {}", status)),
        500..=599 => Error::fetch(source, format!("Origin server error (transient): {}", status)),
        _ => Error::fetch(source, format!("Unexpected status: {}", status)),
    })
}
