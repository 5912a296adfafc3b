//! Poll engine
//!
//! The PollEngine is responsible for:
//! - Asking every source for its current items
//! - Filtering them through the seen store
//! - Composing one notification per cycle
//! - Dispatching it to every comm
//! - Applying reloaded configuration to all components, or to none
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  fetch()   ┌──────────────┐filter_new()┌─────────────┐
//! │ Sources  │──────────▶│  PollEngine  │──────────▶│  SeenStore  │
//! └──────────┘            └──────────────┘            └─────────────┘
//!                                │
//!                   compose()    │   send()
//!                                ▼
//!                         ┌──────────────┐
//!                         │    Comms     │
//!                         └──────────────┘
//! ```
//!
//! ## Failure Isolation
//!
//! A source that fails to fetch, or whose seen-store batch fails, is skipped
//! for the cycle and none of its items is recorded. A comm that fails to deliver does not stop the others. None
//! of these end the cycle early.

pub mod message;

pub use message::{FailureNotice, Notification, SourceItems};

use crate::config::{ConfigHandle, WebHunterConfig};
use crate::error::{Error, Result};
use crate::traits::{Comm, Delivery, SeenStore, Source};
use message::{compose, one_line};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

/// Capacity of the engine event channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Events emitted by the PollEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A cycle started
    CycleStarted { sources: usize },

    /// A source contributed nothing this cycle because of an error
    SourceFailed { source: String, error: String },

    /// A source contributed novel items
    NewItems { source: String, count: usize },

    /// A cycle found nothing new
    CycleIdle,

    /// A comm was handed a message
    Dispatched { comm: String, outcome: DeliveryOutcome },

    /// A message was composed in simulate mode and not sent
    Simulated {
        comm: String,
        title: Option<String>,
        message: String,
        url: Option<String>,
    },

    /// Items were marked seen without notifying
    Seeded { source: String, marked: usize },

    /// A reloaded configuration became current
    ReloadAccepted,

    /// A reloaded configuration was discarded
    ReloadRejected { components: Vec<String> },
}

/// What happened to one message at one comm
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Accepted by the channel
    Delivered { id: Option<String> },
    /// Refused or unreachable
    Failed { reason: String },
    /// The comm raised an error (malformed call)
    Error { error: String },
    /// Simulate mode, nothing sent
    Simulated,
}

impl From<Delivery> for DeliveryOutcome {
    fn from(delivery: Delivery) -> Self {
        match delivery {
            Delivery::Delivered { id } => DeliveryOutcome::Delivered { id },
            Delivery::Failed { reason } => DeliveryOutcome::Failed { reason },
        }
    }
}

/// Per-comm result of a broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub comm: String,
    pub outcome: DeliveryOutcome,
}

/// Summary of one poll cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Novel items per contributing source, in registry order
    pub novel: Vec<SourceItems>,
    /// Sources skipped because of fetch or storage errors
    pub failed_sources: Vec<String>,
    /// The composed message, when anything was novel
    pub notification: Option<Notification>,
    /// Per-comm outcomes, in registry order
    pub deliveries: Vec<DeliveryRecord>,
}

impl CycleReport {
    /// Total number of novel items
    pub fn novel_count(&self) -> usize {
        self.novel.iter().map(|group| group.items.len()).sum()
    }
}

/// Core poll engine
///
/// Owns the loaded sources and comms. It keeps no state of its own between
/// cycles; everything persistent lives in the seen store.
///
/// ## Lifecycle
///
/// 1. Create with [`PollEngine::new()`] from registry-loaded plugins
/// 2. Drive with [`PollEngine::run_cycle()`], usually through the
///    [`crate::Scheduler`]
/// 3. Apply new configuration with [`PollEngine::reload()`] between cycles
pub struct PollEngine {
    /// Active sources, in registry order
    sources: Vec<Box<dyn Source>>,

    /// Active comms, in registry order
    comms: Vec<Box<dyn Comm>>,

    /// Shared configuration snapshot
    config: ConfigHandle,

    /// Shared seen store
    store: Arc<dyn SeenStore>,

    /// Serializes reload attempts
    reload_lock: Mutex<()>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl PollEngine {
    /// Create a new poll engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        sources: Vec<Box<dyn Source>>,
        comms: Vec<Box<dyn Comm>>,
        config: ConfigHandle,
        store: Arc<dyn SeenStore>,
    ) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let engine = Self {
            sources,
            comms,
            config,
            store,
            reload_lock: Mutex::new(()),
            event_tx: tx,
        };

        (engine, rx)
    }

    /// Shared configuration handle
    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Identities of the loaded sources
    pub fn source_names(&self) -> Vec<String> {
        self.sources
            .iter()
            .map(|s| s.name().type_name().to_string())
            .collect()
    }

    /// Identities of the loaded comms
    pub fn comm_names(&self) -> Vec<String> {
        self.comms
            .iter()
            .map(|c| c.name().type_name().to_string())
            .collect()
    }

    /// Run one poll cycle
    ///
    /// Never fails: source and comm errors are logged, reported in the
    /// [`CycleReport`], and isolated to the component that raised them.
    pub async fn run_cycle(&self) -> CycleReport {
        debug!("Running poll cycle over {} source(s)", self.sources.len());
        self.emit_event(EngineEvent::CycleStarted {
            sources: self.sources.len(),
        });

        let mut report = CycleReport::default();

        for source in &self.sources {
            let name = source.name().type_name().to_string();
            match self.collect_novel(source.as_ref()).await {
                Ok(items) if items.is_empty() => {
                    debug!(source = %name, "No new items");
                }
                Ok(items) => {
                    debug!(source = %name, "{} new item(s)", items.len());
                    self.emit_event(EngineEvent::NewItems {
                        source: name.clone(),
                        count: items.len(),
                    });
                    report.novel.push(SourceItems {
                        source: name,
                        items,
                    });
                }
                Err(e) => {
                    match &e {
                        Error::Storage(_) => {
                            error!(source = %name, "Seen store failed, skipping source this cycle: {}", e)
                        }
                        _ => warn!(source = %name, "Skipping source this cycle: {}", e),
                    }
                    self.emit_event(EngineEvent::SourceFailed {
                        source: name.clone(),
                        error: e.to_string(),
                    });
                    report.failed_sources.push(name);
                }
            }
        }

        let snapshot = self.config.current();
        let priority = snapshot.server.priority_source();
        let Some(notification) = compose(
            &report.novel,
            &snapshot.server.message_strings,
            priority.as_ref(),
        ) else {
            debug!("No new items found");
            self.emit_event(EngineEvent::CycleIdle);
            return report;
        };

        info!(
            "Found {} new item(s) on {}",
            notification.count,
            notification.sources.join(", ")
        );

        report.deliveries = self
            .broadcast(
                &notification.body,
                Some(&notification.title),
                notification.url.as_deref(),
            )
            .await;
        report.notification = Some(notification);
        report
    }

    /// Fetch a source and keep the items the seen store has not recorded
    ///
    /// The source's items are marked in one batch, so a storage failure
    /// leaves all of them unrecorded for the next cycle.
    async fn collect_novel(&self, source: &dyn Source) -> Result<Vec<crate::traits::Item>> {
        let items = source.fetch().await?;
        source.filter_new(items).await
    }

    /// Mark every currently fetchable item as seen, without notifying
    ///
    /// # Returns
    ///
    /// The number of items that were not recorded before.
    pub async fn seed(&self) -> usize {
        let mut total = 0;
        for source in &self.sources {
            let name = source.name().type_name();
            let items = match source.fetch().await {
                Ok(items) => items,
                Err(e) => {
                    warn!(source = %name, "Skipping source while seeding: {}", e);
                    continue;
                }
            };

            let ids: Vec<String> = items.into_iter().map(|item| item.id).collect();
            match source.seen_store().mark_seen_many(name, &ids).await {
                Ok(marked) => {
                    info!(source = %name, "Seeded {} of {} item(s)", marked, ids.len());
                    self.emit_event(EngineEvent::Seeded {
                        source: name.to_string(),
                        marked,
                    });
                    total += marked;
                }
                Err(e) => error!(source = %name, "Failed to seed: {}", e),
            }
        }
        total
    }

    /// Send a message to every comm, in registry order
    ///
    /// In simulate mode nothing is sent; the message is logged instead.
    pub async fn broadcast(
        &self,
        msg: &str,
        title: Option<&str>,
        url: Option<&str>,
    ) -> Vec<DeliveryRecord> {
        let simulate = self.config.current().server.simulate;
        let line = one_line(msg);
        let mut records = Vec::with_capacity(self.comms.len());

        for comm in &self.comms {
            let name = comm.name().type_name().to_string();

            let outcome = if simulate {
                info!(
                    "sim-msg to {}: t'{}' m'{}' u'{}'",
                    name,
                    title.unwrap_or_default(),
                    line,
                    url.unwrap_or_default()
                );
                self.emit_event(EngineEvent::Simulated {
                    comm: name.clone(),
                    title: title.map(str::to_string),
                    message: msg.to_string(),
                    url: url.map(str::to_string),
                });
                DeliveryOutcome::Simulated
            } else {
                debug!(
                    "msg to {}: t'{}' m'{}' u'{}'",
                    name,
                    title.unwrap_or_default(),
                    line,
                    url.unwrap_or_default()
                );
                match comm.send(msg, title, url).await {
                    Ok(delivery @ Delivery::Delivered { .. }) => {
                        info!(comm = %name, "Notification delivered");
                        delivery.into()
                    }
                    Ok(Delivery::Failed { reason }) => {
                        warn!(comm = %name, "Notification not delivered: {}", reason);
                        DeliveryOutcome::Failed { reason }
                    }
                    Err(e) => {
                        error!(comm = %name, "Notification raised an error: {}", e);
                        DeliveryOutcome::Error {
                            error: e.to_string(),
                        }
                    }
                }
            };

            self.emit_event(EngineEvent::Dispatched {
                comm: name.clone(),
                outcome: outcome.clone(),
            });
            records.push(DeliveryRecord {
                comm: name,
                outcome,
            });
        }

        records
    }

    /// Send the configured startup message, if any
    pub async fn announce_startup(&self) -> Vec<DeliveryRecord> {
        let snapshot = self.config.current();
        let strings = &snapshot.server.message_strings;
        if strings.server_startup_msg_text.trim().is_empty() {
            return Vec::new();
        }
        self.broadcast(
            &strings.server_startup_msg_text,
            Some(&strings.server_info_msg_title),
            None,
        )
        .await
    }

    /// Send a failure notice to every comm
    pub async fn notify_failure(&self, notice: &FailureNotice) -> Vec<DeliveryRecord> {
        let snapshot = self.config.current();
        let strings = &snapshot.server.message_strings;
        let msg = notice.render(&strings.server_shutdown_msg_text);
        self.broadcast(&msg, Some(&strings.server_info_msg_title), None)
            .await
    }

    /// Apply a new configuration snapshot to every component, or to none
    ///
    /// Every source, then every comm, validates its fragment. Only when all
    /// accept is the snapshot committed to the shared handle. Reload attempts
    /// are serialized.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: the new snapshot is current
    /// - `Err(Error::Config)`: the snapshot itself is invalid
    /// - `Err(Error::ReloadRejected)`: listed components refused it; the old
    ///   snapshot stays current
    pub async fn reload(&self, new_config: WebHunterConfig) -> Result<()> {
        let _guard = self.reload_lock.lock().await;

        new_config.validate()?;

        let mut rejected = Vec::new();
        for source in &self.sources {
            Self::collect_verdict(
                source.name().type_name(),
                source.reload(&new_config),
                &mut rejected,
            );
        }
        for comm in &self.comms {
            Self::collect_verdict(
                comm.name().type_name(),
                comm.reload(&new_config),
                &mut rejected,
            );
        }

        if !rejected.is_empty() {
            error!(
                "Attempted to reload configuration, but not accepted by {:?}",
                rejected
            );
            error!("Retaining old config");
            self.emit_event(EngineEvent::ReloadRejected {
                components: rejected.clone(),
            });
            return Err(Error::ReloadRejected {
                components: rejected,
            });
        }

        self.warn_on_plugin_set_change(&new_config);
        self.config.replace(new_config);
        info!("Configuration reloaded");
        self.emit_event(EngineEvent::ReloadAccepted);
        Ok(())
    }

    fn collect_verdict(name: &str, verdict: Result<bool>, rejected: &mut Vec<String>) {
        match verdict {
            Ok(true) => debug!("{} accepted new configuration", name),
            Ok(false) => rejected.push(name.to_string()),
            Err(e) => {
                warn!("{} could not read new configuration: {}", name, e);
                rejected.push(name.to_string());
            }
        }
    }

    fn warn_on_plugin_set_change(&self, new_config: &WebHunterConfig) {
        let current = self.config.current();
        if current.active_sources() != new_config.active_sources()
            || current.active_comms() != new_config.active_comms()
        {
            warn!("Active sources or comms changed; this takes effect after a restart");
        }
    }

    /// Persist pending seen-store writes
    pub async fn flush(&self) -> Result<()> {
        self.store.flush().await
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            // Full or closed: monitoring lags behind, polling does not wait for it
            debug!("Engine event channel full or closed, dropping event");
        }
    }
}
