// # Webhook Comm
//
// POSTs each notification as a JSON document:
//
// ```json
// {"title": "New items found", "message": "There are 2 new items on Funda", "url": "https://..."}
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use webhunter_core::registry::settings::{checked_settings, review_reload, settings_for, url_problem};
use webhunter_core::{
    Comm, CommContext, CommFactory, ConfigHandle, Delivery, PluginKind, PluginName, PluginSettings,
    Result, WebHunterConfig,
};

use crate::{http_client, refusal, require_message};

/// `webhook` configuration fragment
#[derive(Clone, PartialEq, Deserialize)]
pub struct WebhookSettings {
    /// Target URL
    pub url: String,

    /// Extra request headers, e.g. an Authorization header
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Per-request timeout in seconds
    #[serde(default = "crate::default_timeout_secs")]
    pub timeout_secs: u64,
}

// Header values may carry credentials
impl std::fmt::Debug for WebhookSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSettings")
            .field("url", &self.url)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl PluginSettings for WebhookSettings {
    fn problem(&self) -> Option<String> {
        if let Some(problem) = url_problem(&self.url) {
            return Some(problem);
        }
        if self.timeout_secs == 0 {
            return Some("timeout_secs must be > 0".to_string());
        }
        if let Some(name) = self
            .headers
            .keys()
            .find(|name| reqwest::header::HeaderName::from_bytes(name.as_bytes()).is_err())
        {
            return Some(format!("invalid header name: {}", name));
        }
        None
    }
}

/// Request body of one notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookPayload<'a> {
    pub title: Option<&'a str>,
    pub message: &'a str,
    pub url: Option<&'a str>,
}

/// Webhook comm
pub struct WebhookComm {
    name: PluginName,
    config: ConfigHandle,
    client: reqwest::Client,
}

#[async_trait]
impl Comm for WebhookComm {
    fn name(&self) -> &PluginName {
        &self.name
    }

    async fn send(&self, msg: &str, title: Option<&str>, url: Option<&str>) -> Result<Delivery> {
        require_message(msg)?;
        let settings: WebhookSettings = settings_for(
            &self.config.current(),
            PluginKind::Comm,
            &self.name,
        )?;

        let mut request = self
            .client
            .post(&settings.url)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .json(&WebhookPayload {
                title,
                message: msg,
                url,
            });
        for (name, value) in &settings.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return Ok(Delivery::Failed {
                    reason: format!("HTTP request failed: {}", e),
                });
            }
        };

        if !response.status().is_success() {
            return Ok(Delivery::Failed {
                reason: refusal(response).await,
            });
        }

        tracing::debug!(comm = %self.name, "Webhook answered {}", response.status());
        Ok(Delivery::Delivered { id: None })
    }

    fn reload(&self, config: &WebHunterConfig) -> Result<bool> {
        review_reload::<WebhookSettings>(config, PluginKind::Comm, &self.name)
    }
}

/// Factory for `webhook` comms
pub struct WebhookFactory;

impl CommFactory for WebhookFactory {
    fn create(&self, context: CommContext) -> Result<Box<dyn Comm>> {
        checked_settings::<WebhookSettings>(
            &context.config.current(),
            PluginKind::Comm,
            &context.name,
        )?;

        Ok(Box::new(WebhookComm {
            name: context.name,
            config: context.config,
            client: http_client()?,
        }))
    }
}
