//! Error types for WebHunter
//!
//! Only [`Error::Config`] and [`Error::PluginResolution`] raised during startup
//! are fatal to the process. Every other variant is isolated to the source,
//! comm or cycle it occurred in.

use thiserror::Error;

/// Result type alias for WebHunter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Which kind of plugin a name was resolved for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    Source,
    Comm,
}

impl std::fmt::Display for PluginKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginKind::Source => f.write_str("source"),
            PluginKind::Comm => f.write_str("comm"),
        }
    }
}

/// Core error type for WebHunter
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A configured source or comm name has no registered implementation
    #[error("Unresolved {kind} plugin '{name}' (looked for module '{module_path}')")]
    PluginResolution {
        kind: PluginKind,
        name: String,
        module_path: String,
    },

    /// A source could not produce its current items
    #[error("Fetch failed for {source_name}: {message}")]
    Fetch {
        source_name: String,
        message: String,
    },

    /// The seen store could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// A comm could not deliver a notification
    #[error("Delivery failed via {comm}: {message}")]
    Delivery { comm: String, message: String },

    /// One or more components refused a reloaded configuration
    #[error("Reload rejected by {}", components.join(", "))]
    ReloadRejected { components: Vec<String> },

    /// Invalid call arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a plugin resolution error
    pub fn plugin_resolution(
        kind: PluginKind,
        name: impl Into<String>,
        module_path: impl Into<String>,
    ) -> Self {
        Self::PluginResolution {
            kind,
            name: name.into(),
            module_path: module_path.into(),
        }
    }

    /// Create a fetch error for a source
    pub fn fetch(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Short, stable name of the error kind
    ///
    /// Used as the category line of the failure notice sent to comms when the
    /// scheduler loop dies.
    pub fn category(&self) -> &'static str {
        match self {
            Error::Config(_) => "ConfigError",
            Error::PluginResolution { .. } => "PluginResolutionError",
            Error::Fetch { .. } => "FetchError",
            Error::Storage(_) => "StorageError",
            Error::Delivery { .. } => "DeliveryError",
            Error::ReloadRejected { .. } => "ReloadRejected",
            Error::InvalidInput(_) => "InvalidInput",
            Error::Io(_) => "IoError",
            Error::Json(_) => "JsonError",
            Error::Other(_) => "Error",
        }
    }

    /// Whether this error must abort startup
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(self, Error::Config(_) | Error::PluginResolution { .. })
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{:#}", err))
    }
}
