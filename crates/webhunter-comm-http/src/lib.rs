// # HTTP Notification Channels
//
// This crate provides HTTP-based comms for WebHunter:
//
// - `pushover`: push notifications through the Pushover messages API
// - `webhook`: a JSON POST to any URL (chat bridges, automation hooks)
//
// ## Failure Model
//
// One request per `send()`. Transport errors and non-2xx answers become
// `Delivery::Failed`; the engine logs them and moves on to the next comm.
// No retries here. An empty message is a malformed call and returns
// `Error::InvalidInput`.
//
// ## Security
//
// Tokens and header values never appear in logs or Debug output.

mod pushover;
mod webhook;

pub use pushover::{PushoverComm, PushoverFactory, PushoverSettings};
pub use webhook::{WebhookComm, WebhookFactory, WebhookSettings};

use webhunter_core::registry::settings::USER_AGENT;
use webhunter_core::{Error, PluginRegistry, Result};

/// Default per-request timeout
const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Register the HTTP comms with a registry
///
/// # Example
///
/// ```rust
/// use webhunter_core::PluginRegistry;
///
/// let mut registry = PluginRegistry::new();
/// webhunter_comm_http::register(&mut registry).unwrap();
/// assert!(registry.has_comm("Pushover"));
/// ```
pub fn register(registry: &mut PluginRegistry) -> Result<()> {
    registry.register_comm("pushover", Box::new(PushoverFactory))?;
    registry.register_comm("webhook", Box::new(WebhookFactory))?;
    Ok(())
}

pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))
}

/// Refuse empty messages before any request is made
pub(crate) fn require_message(msg: &str) -> Result<()> {
    if msg.trim().is_empty() {
        return Err(Error::invalid_input("message cannot be empty"));
    }
    Ok(())
}

/// Reason text for a refused request, body included when readable
pub(crate) async fn refusal(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string());

    match status.as_u16() {
        401 | 403 => format!("Authentication failed. Status: {}", status),
        429 => format!("Rate limit exceeded. Status: {}", status),
        500..=599 => format!("Server error (transient): {} - {}", status, body),
        _ => format!("Request refused: {} - {}", status, body),
    }
}
