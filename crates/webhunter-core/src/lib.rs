// # webhunter-core
//
// Core library for the WebHunter polling notifier.
//
// ## Architecture Overview
//
// This library provides everything between "a site lists some items" and
// "a notification went out":
// - **Source**: Trait for listing the items currently visible at one origin
// - **Comm**: Trait for delivering a notification through one channel
// - **SeenStore**: Trait for remembering which items were already reported
// - **PollEngine**: One fetch → dedupe → compose → dispatch pass
// - **Scheduler**: Jittered polling loop with reload and shutdown commands
// - **PluginRegistry**: Name → factory registry for sources and comms
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from plugin crates
// 2. **Plugin-Based**: Sources and comms are registered by name, no hard-coded if-else
// 3. **Library-First**: The daemon is a thin layer over this crate
// 4. **Snapshot Configuration**: Components read one shared snapshot, replaced only after all accept

pub mod config;
pub mod engine;
pub mod error;
pub mod liveness;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{ConfigHandle, MessageStrings, PluginEntry, PluginTable, ServerConfig, StoreConfig, WebHunterConfig};
pub use engine::{CycleReport, DeliveryOutcome, DeliveryRecord, EngineEvent, FailureNotice, Notification, PollEngine, SourceItems};
pub use error::{Error, PluginKind, Result};
pub use liveness::{Liveness, LivenessState, NoLiveness, SystemdNotify};
pub use registry::{PluginName, PluginRegistry, PluginSettings};
pub use scheduler::{Command, ConfigLoader, FileConfigLoader, PollInterval, Scheduler};
pub use state::{FileSeenStore, MemorySeenStore, open_store};
pub use traits::{Comm, CommContext, CommFactory, Delivery, Item, SeenRecord, SeenStore, Source, SourceContext, SourceFactory};
