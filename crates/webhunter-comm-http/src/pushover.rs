// # Pushover Comm
//
// Sends one push notification per call.
//
// ## API Reference
//
// - Messages API: https://pushover.net/api
// - POST `/1/messages.json` with form fields `token`, `user`, `message`,
//   optional `title`, `url`, `priority`, `device`
// - Success answers `{"status": 1, "request": "<uuid>"}`

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use webhunter_core::registry::settings::{checked_settings, review_reload, settings_for, url_problem};
use webhunter_core::{
    Comm, CommContext, CommFactory, ConfigHandle, Delivery, PluginKind, PluginName, PluginSettings,
    Result, WebHunterConfig,
};

use crate::{http_client, refusal, require_message};

/// Pushover messages endpoint
const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";

/// Longest message Pushover accepts, in characters
const MAX_MESSAGE_CHARS: usize = 1024;

/// Longest title Pushover accepts, in characters
const MAX_TITLE_CHARS: usize = 250;

/// `pushover` configuration fragment
#[derive(Clone, PartialEq, Deserialize)]
pub struct PushoverSettings {
    /// Application token
    pub token: String,

    /// User or group key
    pub user: String,

    /// Message priority, -2 (silent) to 2 (emergency)
    #[serde(default)]
    pub priority: i8,

    /// Deliver to one device only
    #[serde(default)]
    pub device: Option<String>,

    /// Override of the messages endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "crate::default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    PUSHOVER_API_URL.to_string()
}

// Custom Debug implementation that hides the credentials
impl std::fmt::Debug for PushoverSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushoverSettings")
            .field("token", &"<REDACTED>")
            .field("user", &"<REDACTED>")
            .field("priority", &self.priority)
            .field("device", &self.device)
            .field("api_url", &self.api_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl PluginSettings for PushoverSettings {
    fn problem(&self) -> Option<String> {
        if self.token.trim().is_empty() {
            return Some("token is required".to_string());
        }
        if self.user.trim().is_empty() {
            return Some("user is required".to_string());
        }
        if !(-2..=2).contains(&self.priority) {
            return Some(format!("priority must be between -2 and 2. Got: {}", self.priority));
        }
        if self.timeout_secs == 0 {
            return Some("timeout_secs must be > 0".to_string());
        }
        url_problem(&self.api_url)
    }
}

impl PushoverSettings {
    /// Form fields of one message, truncated to Pushover's limits
    pub fn form(&self, msg: &str, title: Option<&str>, url: Option<&str>) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("token", self.token.clone()),
            ("user", self.user.clone()),
            ("message", truncate(msg, MAX_MESSAGE_CHARS)),
            ("priority", self.priority.to_string()),
        ];
        if let Some(title) = title {
            fields.push(("title", truncate(title, MAX_TITLE_CHARS)));
        }
        if let Some(url) = url {
            fields.push(("url", url.to_string()));
        }
        if let Some(device) = &self.device {
            fields.push(("device", device.clone()));
        }
        // Emergency messages must say how often to repeat and when to give up
        if self.priority == 2 {
            fields.push(("retry", "60".to_string()));
            fields.push(("expire", "3600".to_string()));
        }
        fields
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[derive(Debug, Deserialize)]
struct PushoverAnswer {
    status: i64,
    #[serde(default)]
    request: Option<String>,
    #[serde(default)]
    errors: Vec<String>,
}

/// Pushover comm
pub struct PushoverComm {
    name: PluginName,
    config: ConfigHandle,
    client: reqwest::Client,
}

#[async_trait]
impl Comm for PushoverComm {
    fn name(&self) -> &PluginName {
        &self.name
    }

    async fn send(&self, msg: &str, title: Option<&str>, url: Option<&str>) -> Result<Delivery> {
        require_message(msg)?;
        let settings: PushoverSettings = settings_for(
            &self.config.current(),
            PluginKind::Comm,
            &self.name,
        )?;

        let response = match self
            .client
            .post(&settings.api_url)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .form(&settings.form(msg, title, url))
            .send()
            .await
        {
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

        match response.json::<PushoverAnswer>().await {
            Ok(answer) if answer.status == 1 => {
                tracing::debug!(comm = %self.name, "Pushover accepted request {:?}", answer.request);
                Ok(Delivery::Delivered { id: answer.request })
            }
            Ok(answer) => Ok(Delivery::Failed {
                reason: format!("Pushover refused message: {}", answer.errors.join("; ")),
            }),
            Err(e) => Ok(Delivery::Failed {
                reason: format!("Failed to parse response: {}", e),
            }),
        }
    }

    fn reload(&self, config: &WebHunterConfig) -> Result<bool> {
        review_reload::<PushoverSettings>(config, PluginKind::Comm, &self.name)
    }
}

/// Factory for `pushover` comms
pub struct PushoverFactory;

impl CommFactory for PushoverFactory {
    fn create(&self, context: CommContext) -> Result<Box<dyn Comm>> {
        checked_settings::<PushoverSettings>(
            &context.config.current(),
            PluginKind::Comm,
            &context.name,
        )?;

        Ok(Box::new(PushoverComm {
            name: context.name,
            config: context.config,
            client: http_client()?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use webhunter_core::{Error, PluginEntry, PluginTable};

    fn config_with(fragment: Value) -> WebHunterConfig {
        WebHunterConfig {
            comms: PluginTable::new().with("pushover", PluginEntry::active(fragment)),
            ..WebHunterConfig::default()
        }
    }

    fn create(fragment: Value) -> Result<Box<dyn Comm>> {
        PushoverFactory.create(CommContext {
            name: PluginName::parse("pushover").unwrap(),
            config: ConfigHandle::new(config_with(fragment)),
        })
    }

    fn settings(fragment: Value) -> PushoverSettings {
        serde_json::from_value(fragment).unwrap()
    }

    #[test]
    fn test_form_fields() {
        let s = settings(json!({"token": "app", "user": "me", "device": "phone"}));
        let form = s.form("There are 2 new items", Some("New items found"), Some("https://x.example/1"));

        let get = |key: &str| form.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str());
        assert_eq!(get("message"), Some("There are 2 new items"));
        assert_eq!(get("title"), Some("New items found"));
        assert_eq!(get("url"), Some("https://x.example/1"));
        assert_eq!(get("priority"), Some("0"));
        assert_eq!(get("device"), Some("phone"));
        assert_eq!(get("retry"), None);
    }

    #[test]
    fn test_form_truncates_and_handles_emergency() {
        let s = settings(json!({"token": "app", "user": "me", "priority": 2}));
        let long = "x".repeat(2000);
        let form = s.form(&long, None, None);

        let message = form.iter().find(|(k, _)| *k == "message").unwrap();
        assert_eq!(message.1.chars().count(), MAX_MESSAGE_CHARS);
        assert!(form.iter().any(|(k, _)| *k == "retry"));
        assert!(form.iter().all(|(k, _)| *k != "title"));
    }

    #[test]
    fn test_debug_hides_credentials() {
        let s = settings(json!({"token": "secret-token", "user": "secret-user"}));
        let debug = format!("{:?}", s);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<REDACTED>"));
    }

    #[test]
    fn test_factory_validation() {
        assert!(create(json!({"token": "app", "user": "me"})).is_ok());
        assert!(create(json!({"token": "", "user": "me"})).is_err());
        assert!(create(json!({"token": "app", "user": "me", "priority": 3})).is_err());
        assert!(create(json!({"user": "me"})).is_err());
    }

    #[test]
    fn test_reload_verdicts() {
        let comm = create(json!({"token": "app", "user": "me"})).unwrap();
        assert!(comm.reload(&config_with(json!({"token": "app2", "user": "me"}))).unwrap());
        assert!(!comm.reload(&config_with(json!({"token": "app", "user": "me", "priority": -3}))).unwrap());
        assert!(comm.reload(&WebHunterConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_empty_message_is_invalid_input() {
        let comm = create(json!({"token": "app", "user": "me"})).unwrap();
        assert!(matches!(comm.send("", None, None).await, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_unreachable_api_is_failed_delivery() {
        let comm = create(json!({
            "token": "app",
            "user": "me",
            "api_url": "http://127.0.0.1:9/1/messages.json",
            "timeout_secs": 2
        }))
        .unwrap();

        let delivery = comm.send("hello", None, None).await.unwrap();
        assert!(!delivery.is_delivered());
    }
}
