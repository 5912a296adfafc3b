//! Plugin registry
//!
//! The registry maps plugin names to factories, so that the `sources` and
//! `comm` tables of the configuration can be turned into live instances
//! without hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use webhunter_core::{ConfigHandle, PluginRegistry};
//!
//! let mut registry = PluginRegistry::new();
//! webhunter_source_feed::register(&mut registry)?;
//! webhunter_comm_http::register(&mut registry)?;
//!
//! let sources = registry.load_sources(&config, store.clone())?;
//! let comms = registry.load_comms(&config)?;
//! ```
//!
//! ## Registration
//!
//! Plugin crates expose a `register` function:
//!
//! ```rust,ignore
//! pub fn register(registry: &mut PluginRegistry) -> webhunter_core::Result<()> {
//!     registry.register_source("json_feed", Box::new(JsonFeedFactory))
//! }
//! ```
//!
//! ## Lifetime
//!
//! Loading happens once at startup. A reload changes the configuration the
//! loaded instances read, never the set of instances; activating or
//! deactivating a plugin takes a restart.

mod naming;
pub mod settings;

pub use naming::PluginName;
pub use settings::PluginSettings;

use crate::config::ConfigHandle;
use crate::error::{Error, PluginKind, Result};
use crate::traits::{Comm, CommContext, CommFactory, SeenStore, Source, SourceContext, SourceFactory};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Name -> factory registry for sources and comms
///
/// Keys are module paths (lower_snake_case), so `JsonFeed`, `json_feed` and
/// `Json_Feed` all resolve to the same factory.
#[derive(Default)]
pub struct PluginRegistry {
    /// Registered source factories
    sources: HashMap<String, Box<dyn SourceFactory>>,

    /// Registered comm factories
    comms: HashMap<String, Box<dyn CommFactory>>,
}

impl PluginRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source factory
    ///
    /// # Parameters
    ///
    /// - `name`: plugin name (e.g., "json_feed")
    /// - `factory`: factory object for creating source instances
    pub fn register_source(
        &mut self,
        name: &str,
        factory: Box<dyn SourceFactory>,
    ) -> Result<()> {
        let name = PluginName::parse(name)?;
        self.sources.insert(name.module_path().to_string(), factory);
        Ok(())
    }

    /// Register a comm factory
    ///
    /// # Parameters
    ///
    /// - `name`: plugin name (e.g., "pushover")
    /// - `factory`: factory object for creating comm instances
    pub fn register_comm(&mut self, name: &str, factory: Box<dyn CommFactory>) -> Result<()> {
        let name = PluginName::parse(name)?;
        self.comms.insert(name.module_path().to_string(), factory);
        Ok(())
    }

    /// Create one source
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn Source>)`: created source instance
    /// - `Err(Error::PluginResolution)`: no factory registered under this name
    /// - `Err(Error::Config)`: the factory refused the configured fragment
    pub fn create_source(
        &self,
        raw_name: &str,
        config: &ConfigHandle,
        store: Arc<dyn SeenStore>,
    ) -> Result<Box<dyn Source>> {
        let name = PluginName::parse(raw_name)?;
        let factory = self.sources.get(name.module_path()).ok_or_else(|| {
            Error::plugin_resolution(PluginKind::Source, raw_name, name.module_path())
        })?;

        factory.create(SourceContext {
            name,
            config: config.clone(),
            store,
        })
    }

    /// Create one comm
    pub fn create_comm(&self, raw_name: &str, config: &ConfigHandle) -> Result<Box<dyn Comm>> {
        let name = PluginName::parse(raw_name)?;
        let factory = self.comms.get(name.module_path()).ok_or_else(|| {
            Error::plugin_resolution(PluginKind::Comm, raw_name, name.module_path())
        })?;

        factory.create(CommContext {
            name,
            config: config.clone(),
        })
    }

    /// Create every active source, in registry order
    ///
    /// The first unresolved name aborts loading.
    pub fn load_sources(
        &self,
        config: &ConfigHandle,
        store: Arc<dyn SeenStore>,
    ) -> Result<Vec<Box<dyn Source>>> {
        let snapshot = config.current();
        let mut sources = Vec::new();
        for raw_name in snapshot.active_sources() {
            let source = self.create_source(raw_name, config, store.clone())?;
            info!(
                "Loaded source {} (module {})",
                source.name(),
                source.name().module_path()
            );
            sources.push(source);
        }
        Ok(sources)
    }

    /// Create every active comm, in registry order
    pub fn load_comms(&self, config: &ConfigHandle) -> Result<Vec<Box<dyn Comm>>> {
        let snapshot = config.current();
        let mut comms = Vec::new();
        for raw_name in snapshot.active_comms() {
            let comm = self.create_comm(raw_name, config)?;
            info!(
                "Loaded comm {} (module {})",
                comm.name(),
                comm.name().module_path()
            );
            comms.push(comm);
        }
        Ok(comms)
    }

    /// List all registered source names
    pub fn list_sources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.keys().cloned().collect();
        names.sort();
        names
    }

    /// List all registered comm names
    pub fn list_comms(&self) -> Vec<String> {
        let mut names: Vec<String> = self.comms.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a source name resolves
    pub fn has_source(&self, name: &str) -> bool {
        PluginName::parse(name).is_ok_and(|n| self.sources.contains_key(n.module_path()))
    }

    /// Check if a comm name resolves
    pub fn has_comm(&self, name: &str) -> bool {
        PluginName::parse(name).is_ok_and(|n| self.comms.contains_key(n.module_path()))
    }
}
