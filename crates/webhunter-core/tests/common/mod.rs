//! Test doubles and common utilities for contract tests
//!
//! The doubles are cheap to clone: clones share their counters and
//! recordings, so a test keeps one clone and hands another to the engine.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use webhunter_core::error::{Error, Result};
use webhunter_core::{
    Comm, ConfigHandle, Delivery, Item, Liveness, LivenessState, MemorySeenStore, PluginEntry,
    PluginName, PluginTable, PollEngine, SeenStore, Source, WebHunterConfig,
};

/// A source returning a fixed, replaceable list of items
#[derive(Clone)]
pub struct StaticSource {
    name: PluginName,
    store: Arc<dyn SeenStore>,
    items: Arc<Mutex<Vec<Item>>>,
    fail_fetch: Arc<AtomicBool>,
    accept_reload: Arc<AtomicBool>,
    fetch_calls: Arc<AtomicUsize>,
    reload_calls: Arc<AtomicUsize>,
}

impl StaticSource {
    pub fn new(name: &str, store: Arc<dyn SeenStore>, ids: &[&str]) -> Self {
        let name = PluginName::parse(name).unwrap();
        let items = ids
            .iter()
            .map(|id| item_for(name.type_name(), id))
            .collect();
        Self {
            name,
            store,
            items: Arc::new(Mutex::new(items)),
            fail_fetch: Arc::new(AtomicBool::new(false)),
            accept_reload: Arc::new(AtomicBool::new(true)),
            fetch_calls: Arc::new(AtomicUsize::new(0)),
            reload_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_items(&self, ids: &[&str]) {
        let items = ids
            .iter()
            .map(|id| item_for(self.name.type_name(), id))
            .collect();
        *self.items.lock().unwrap() = items;
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn accept_reload(&self, accept: bool) {
        self.accept_reload.store(accept, Ordering::SeqCst);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn reload_calls(&self) -> usize {
        self.reload_calls.load(Ordering::SeqCst)
    }

    pub fn boxed(&self) -> Box<dyn Source> {
        Box::new(self.clone())
    }
}

/// Locator the doubles give an item
pub fn item_for(source: &str, id: &str) -> Item {
    Item::new(
        id,
        format!("https://{}.example/{}", source.to_lowercase(), id),
    )
}

#[async_trait]
impl Source for StaticSource {
    fn name(&self) -> &PluginName {
        &self.name
    }

    fn seen_store(&self) -> &Arc<dyn SeenStore> {
        &self.store
    }

    async fn fetch(&self) -> Result<Vec<Item>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Error::fetch(self.name.type_name(), "origin unreachable"));
        }
        Ok(self.items.lock().unwrap().clone())
    }

    fn reload(&self, _config: &WebHunterConfig) -> Result<bool> {
        self.reload_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.accept_reload.load(Ordering::SeqCst))
    }
}

/// A source whose fetch panics
pub struct PanickingSource {
    name: PluginName,
    store: Arc<dyn SeenStore>,
}

impl PanickingSource {
    pub fn new(name: &str, store: Arc<dyn SeenStore>) -> Self {
        Self {
            name: PluginName::parse(name).unwrap(),
            store,
        }
    }
}

#[async_trait]
impl Source for PanickingSource {
    fn name(&self) -> &PluginName {
        &self.name
    }

    fn seen_store(&self) -> &Arc<dyn SeenStore> {
        &self.store
    }

    async fn fetch(&self) -> Result<Vec<Item>> {
        panic!("origin returned something impossible");
    }

    fn reload(&self, _config: &WebHunterConfig) -> Result<bool> {
        Ok(true)
    }
}

/// How a [`RecordingComm`] answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommBehavior {
    Deliver,
    Fail,
    Error,
}

/// One message handed to a comm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub msg: String,
    pub title: Option<String>,
    pub url: Option<String>,
}

/// A comm recording every send attempt
#[derive(Clone)]
pub struct RecordingComm {
    name: PluginName,
    behavior: CommBehavior,
    sent: Arc<Mutex<Vec<SentMessage>>>,
    accept_reload: Arc<AtomicBool>,
    reload_error: Arc<AtomicBool>,
}

impl RecordingComm {
    pub fn new(name: &str) -> Self {
        Self::with_behavior(name, CommBehavior::Deliver)
    }

    pub fn with_behavior(name: &str, behavior: CommBehavior) -> Self {
        Self {
            name: PluginName::parse(name).unwrap(),
            behavior,
            sent: Arc::new(Mutex::new(Vec::new())),
            accept_reload: Arc::new(AtomicBool::new(true)),
            reload_error: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn accept_reload(&self, accept: bool) {
        self.accept_reload.store(accept, Ordering::SeqCst);
    }

    pub fn error_on_reload(&self, error: bool) {
        self.reload_error.store(error, Ordering::SeqCst);
    }

    pub fn boxed(&self) -> Box<dyn Comm> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl Comm for RecordingComm {
    fn name(&self) -> &PluginName {
        &self.name
    }

    async fn send(&self, msg: &str, title: Option<&str>, url: Option<&str>) -> Result<Delivery> {
        self.sent.lock().unwrap().push(SentMessage {
            msg: msg.to_string(),
            title: title.map(str::to_string),
            url: url.map(str::to_string),
        });
        match self.behavior {
            CommBehavior::Deliver => Ok(Delivery::Delivered {
                id: Some(format!("{}-{}", self.name, self.sent.lock().unwrap().len())),
            }),
            CommBehavior::Fail => Ok(Delivery::Failed {
                reason: "channel refused".to_string(),
            }),
            CommBehavior::Error => Err(Error::Delivery {
                comm: self.name.type_name().to_string(),
                message: "socket closed".to_string(),
            }),
        }
    }

    fn reload(&self, _config: &WebHunterConfig) -> Result<bool> {
        if self.reload_error.load(Ordering::SeqCst) {
            return Err(Error::config("fragment missing"));
        }
        Ok(self.accept_reload.load(Ordering::SeqCst))
    }
}

/// A seen store that fails for chosen sources or writes, and counts calls
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: MemorySeenStore,
    broken_sources: Arc<Mutex<HashSet<String>>>,
    failing_writes: Arc<AtomicUsize>,
    write_calls: Arc<AtomicUsize>,
    fail_flush: Arc<AtomicBool>,
    flush_calls: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn break_source(&self, source_id: &str) {
        self.broken_sources
            .lock()
            .unwrap()
            .insert(source_id.to_string());
    }

    /// Make the next `count` writes fail
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Number of write calls, failed ones included
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn fail_flush(&self, fail: bool) {
        self.fail_flush.store(fail, Ordering::SeqCst);
    }

    pub fn flush_calls(&self) -> usize {
        self.flush_calls.load(Ordering::SeqCst)
    }

    fn check(&self, source_id: &str) -> Result<()> {
        if self.broken_sources.lock().unwrap().contains(source_id) {
            return Err(Error::storage("connection reset"));
        }
        Ok(())
    }

    fn check_write(&self, source_id: &str) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.check(source_id)?;
        let failing = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(Error::storage("write failed"));
        }
        Ok(())
    }
}

#[async_trait]
impl SeenStore for FlakyStore {
    async fn check_and_mark(&self, source_id: &str, item_id: &str) -> Result<bool> {
        self.check_write(source_id)?;
        self.inner.check_and_mark(source_id, item_id).await
    }

    async fn check_and_mark_many(&self, source_id: &str, item_ids: &[String]) -> Result<Vec<bool>> {
        self.check_write(source_id)?;
        self.inner.check_and_mark_many(source_id, item_ids).await
    }

    async fn is_seen(&self, source_id: &str, item_id: &str) -> Result<bool> {
        self.check(source_id)?;
        self.inner.is_seen(source_id, item_id).await
    }

    async fn mark_seen(&self, source_id: &str, item_id: &str) -> Result<()> {
        self.check_write(source_id)?;
        self.inner.mark_seen(source_id, item_id).await
    }

    async fn mark_seen_many(&self, source_id: &str, item_ids: &[String]) -> Result<usize> {
        self.check_write(source_id)?;
        self.inner.mark_seen_many(source_id, item_ids).await
    }

    async fn count(&self, source_id: &str) -> Result<usize> {
        self.check(source_id)?;
        self.inner.count(source_id).await
    }

    async fn flush(&self) -> Result<()> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_flush.load(Ordering::SeqCst) {
            return Err(Error::storage("disk full"));
        }
        Ok(())
    }
}

/// Records every liveness notification
#[derive(Clone, Default)]
pub struct RecordingLiveness {
    states: Arc<Mutex<Vec<LivenessState>>>,
}

impl RecordingLiveness {
    /// States with reload timestamps zeroed, for comparison
    pub fn states(&self) -> Vec<LivenessState> {
        self.states
            .lock()
            .unwrap()
            .iter()
            .map(|state| match state {
                LivenessState::Reloading { .. } => LivenessState::Reloading { monotonic_usec: 0 },
                other => *other,
            })
            .collect()
    }
}

#[async_trait]
impl Liveness for RecordingLiveness {
    async fn notify(&self, state: LivenessState) {
        self.states.lock().unwrap().push(state);
    }
}

/// Configuration with the given active sources and comms, all fragments empty
pub fn config_for(sources: &[&str], comms: &[&str]) -> WebHunterConfig {
    let mut config = WebHunterConfig::default();
    config.sources = sources.iter().fold(PluginTable::new(), |table, name| {
        table.with(*name, PluginEntry::active(serde_json::json!({})))
    });
    config.comms = comms.iter().fold(PluginTable::new(), |table, name| {
        table.with(*name, PluginEntry::active(serde_json::json!({})))
    });
    config
}

/// Engine over the given doubles, dropping the event receiver
pub fn engine_for(
    sources: &[&StaticSource],
    comms: &[&RecordingComm],
    config: WebHunterConfig,
    store: Arc<dyn SeenStore>,
) -> PollEngine {
    let (engine, _events) = PollEngine::new(
        sources.iter().map(|s| s.boxed()).collect(),
        comms.iter().map(|c| c.boxed()).collect(),
        ConfigHandle::new(config),
        store,
    );
    engine
}
