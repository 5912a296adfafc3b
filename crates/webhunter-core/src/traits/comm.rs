// # Comm Trait
//
// Defines the interface for notification channels (push services, chat
// webhooks, mail relays, ...).
//
// A comm delivers one message per call. Whether a message should be sent,
// and to whom else, is decided by the poll engine.

use crate::config::{ConfigHandle, WebHunterConfig};
use crate::registry::PluginName;
use async_trait::async_trait;

/// Outcome of a single delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Accepted by the channel
    Delivered {
        /// Channel-assigned id, when the channel returns one
        id: Option<String>,
    },
    /// Not delivered; the engine logs it and moves on to the next comm
    Failed {
        /// Why the channel refused or could not be reached
        reason: String,
    },
}

impl Delivery {
    /// Whether the message was accepted
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered { .. })
    }
}

/// Trait for notification channel implementations
///
/// # Errors
///
/// Transient failures (network, channel-side rejection) are reported as
/// [`Delivery::Failed`]. `Err` is reserved for malformed calls, such as an
/// empty message.
#[async_trait]
pub trait Comm: Send + Sync {
    /// Normalized name; its type name identifies the comm in logs
    fn name(&self) -> &PluginName;

    /// Deliver one notification
    ///
    /// # Parameters
    ///
    /// - `msg`: message body, may span several lines
    /// - `title`: optional title
    /// - `url`: optional link
    async fn send(
        &self,
        msg: &str,
        title: Option<&str>,
        url: Option<&str>,
    ) -> Result<Delivery, crate::Error>;

    /// Validate this comm's fragment of a new snapshot
    ///
    /// Same contract as [`crate::Source::reload`].
    fn reload(&self, config: &WebHunterConfig) -> Result<bool, crate::Error>;
}

/// Everything a factory needs to build a comm
#[derive(Debug, Clone)]
pub struct CommContext {
    /// Normalized name from the configuration key
    pub name: PluginName,
    /// Shared configuration snapshot
    pub config: ConfigHandle,
}

/// Helper trait for constructing comms from configuration
pub trait CommFactory: Send + Sync {
    /// Create a Comm instance
    fn create(&self, context: CommContext) -> Result<Box<dyn Comm>, crate::Error>;
}
