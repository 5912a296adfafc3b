//! Contract Test: Poll Cycle
//!
//! Constraints verified:
//! - One cycle reports every unseen item, across all sources
//! - An immediate second cycle over the same items reports nothing
//! - A failing source (fetch or seen store) does not block the others
//! - A failed seen-store write records none of the source's items
//! - A failing comm does not block delivery to the others
//! - Seen items stay seen across a restart of the file store
//! - Seeding marks items without notifying

mod common;

use common::*;
use std::sync::Arc;
use webhunter_core::{
    ConfigHandle, DeliveryOutcome, EngineEvent, FileSeenStore, MemorySeenStore, PollEngine, SeenStore,
    Source,
};

#[tokio::test]
async fn first_cycle_reports_sum_second_reports_nothing() {
    let store: Arc<dyn SeenStore> = Arc::new(MemorySeenStore::new());
    let alpha = StaticSource::new("alpha", store.clone(), &["1", "2", "3"]);
    let beta = StaticSource::new("beta", store.clone(), &["x", "y"]);
    let comm = RecordingComm::new("log");

    let engine = engine_for(
        &[&alpha, &beta],
        &[&comm],
        config_for(&["alpha", "beta"], &["log"]),
        store,
    );

    let first = engine.run_cycle().await;
    assert_eq!(first.novel_count(), 5);
    assert_eq!(first.notification.as_ref().map(|n| n.count), Some(5));
    assert_eq!(comm.sent().len(), 1);

    let second = engine.run_cycle().await;
    assert_eq!(second.novel_count(), 0);
    assert!(second.notification.is_none());
    assert!(second.deliveries.is_empty());
    assert_eq!(comm.sent().len(), 1, "an idle cycle sends nothing");
}

#[tokio::test]
async fn only_new_items_are_reported_later() {
    let store: Arc<dyn SeenStore> = Arc::new(MemorySeenStore::new());
    let alpha = StaticSource::new("alpha", store.clone(), &["1", "2"]);
    let comm = RecordingComm::new("log");
    let engine = engine_for(&[&alpha], &[&comm], config_for(&["alpha"], &["log"]), store);

    engine.run_cycle().await;
    alpha.set_items(&["1", "2", "3"]);
    let report = engine.run_cycle().await;

    assert_eq!(report.novel_count(), 1);
    assert_eq!(report.novel[0].items[0].id, "3");
}

#[tokio::test]
async fn fetch_failure_is_isolated_to_its_source() {
    let store: Arc<dyn SeenStore> = Arc::new(MemorySeenStore::new());
    let alpha = StaticSource::new("alpha", store.clone(), &["1"]);
    let beta = StaticSource::new("beta", store.clone(), &["x", "y"]);
    alpha.fail_fetch(true);
    let comm = RecordingComm::new("log");

    let engine = engine_for(
        &[&alpha, &beta],
        &[&comm],
        config_for(&["alpha", "beta"], &["log"]),
        store,
    );

    let report = engine.run_cycle().await;
    assert_eq!(report.failed_sources, vec!["Alpha".to_string()]);
    assert_eq!(report.novel_count(), 2);
    assert_eq!(report.novel[0].source, "Beta");

    // The failed source's items are still new once it recovers
    alpha.fail_fetch(false);
    let report = engine.run_cycle().await;
    assert_eq!(report.novel_count(), 1);
    assert_eq!(report.novel[0].source, "Alpha");
}

#[tokio::test]
async fn storage_failure_skips_the_source_for_the_cycle() {
    let flaky = FlakyStore::new();
    flaky.break_source("Alpha");
    let store: Arc<dyn SeenStore> = Arc::new(flaky.clone());

    let alpha = StaticSource::new("alpha", store.clone(), &["1", "2"]);
    let beta = StaticSource::new("beta", store.clone(), &["x"]);
    let comm = RecordingComm::new("log");

    let (engine, mut events) = PollEngine::new(
        vec![alpha.boxed(), beta.boxed()],
        vec![comm.boxed()],
        ConfigHandle::new(config_for(&["alpha", "beta"], &["log"])),
        store,
    );

    let report = engine.run_cycle().await;
    assert_eq!(report.failed_sources, vec!["Alpha".to_string()]);
    assert_eq!(report.novel_count(), 1);

    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::SourceFailed { source, error } = event {
            assert_eq!(source, "Alpha");
            assert!(error.contains("Storage error"));
            saw_failure = true;
        }
    }
    assert!(saw_failure);
}

#[tokio::test]
async fn item_is_new_exactly_once_per_source() {
    let store: Arc<dyn SeenStore> = Arc::new(MemorySeenStore::new());
    let alpha = StaticSource::new("alpha", store.clone(), &[]);
    let beta = StaticSource::new("beta", store.clone(), &[]);
    let item = item_for("Alpha", "42");

    assert!(alpha.is_new(&item).await.unwrap());
    assert!(!alpha.is_new(&item).await.unwrap());
    assert!(alpha.filter_new(vec![item.clone()]).await.unwrap().is_empty());

    // Another source's identity is a separate scope
    assert_eq!(beta.filter_new(vec![item.clone(), item]).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_store_write_loses_no_items() {
    let flaky = FlakyStore::new();
    let store: Arc<dyn SeenStore> = Arc::new(flaky.clone());
    let alpha = StaticSource::new("alpha", store.clone(), &["1", "2", "3"]);
    let comm = RecordingComm::new("log");
    let engine = engine_for(&[&alpha], &[&comm], config_for(&["alpha"], &["log"]), store);

    flaky.fail_next_writes(1);
    let first = engine.run_cycle().await;
    assert_eq!(first.failed_sources, vec!["Alpha".to_string()]);
    assert_eq!(first.novel_count(), 0);
    assert!(comm.sent().is_empty());

    let second = engine.run_cycle().await;
    assert!(second.failed_sources.is_empty());
    let ids: Vec<&str> = second.novel[0].items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
    assert_eq!(comm.sent().len(), 1);
}

#[tokio::test]
async fn unwritable_file_store_keeps_items_for_the_next_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("state");
    let store: Arc<dyn SeenStore> =
        Arc::new(FileSeenStore::new(state_dir.join("seen.json")).await.unwrap());
    let alpha = StaticSource::new("alpha", store.clone(), &["1", "2", "3"]);
    let comm = RecordingComm::new("log");
    let engine = engine_for(&[&alpha], &[&comm], config_for(&["alpha"], &["log"]), store);

    std::fs::remove_dir_all(&state_dir).unwrap();
    let first = engine.run_cycle().await;
    assert_eq!(first.failed_sources, vec!["Alpha".to_string()]);
    assert_eq!(first.novel_count(), 0);

    std::fs::create_dir_all(&state_dir).unwrap();
    assert_eq!(engine.run_cycle().await.novel_count(), 3);
    assert_eq!(engine.run_cycle().await.novel_count(), 0);
}

#[tokio::test]
async fn each_source_is_recorded_in_one_write() {
    let flaky = FlakyStore::new();
    let store: Arc<dyn SeenStore> = Arc::new(flaky.clone());
    let alpha = StaticSource::new("alpha", store.clone(), &["1", "2", "3"]);
    let beta = StaticSource::new("beta", store.clone(), &["x", "y"]);
    let comm = RecordingComm::new("log");
    let engine = engine_for(
        &[&alpha, &beta],
        &[&comm],
        config_for(&["alpha", "beta"], &["log"]),
        store,
    );

    assert_eq!(engine.run_cycle().await.novel_count(), 5);
    assert_eq!(flaky.write_calls(), 2);
}

#[tokio::test]
async fn every_comm_is_attempted_in_order() {
    let store: Arc<dyn SeenStore> = Arc::new(MemorySeenStore::new());
    let alpha = StaticSource::new("alpha", store.clone(), &["1"]);
    let refusing = RecordingComm::with_behavior("refusing", CommBehavior::Fail);
    let broken = RecordingComm::with_behavior("broken", CommBehavior::Error);
    let working = RecordingComm::new("working");

    let engine = engine_for(
        &[&alpha],
        &[&refusing, &broken, &working],
        config_for(&["alpha"], &["refusing", "broken", "working"]),
        store,
    );

    let report = engine.run_cycle().await;
    let comms: Vec<&str> = report.deliveries.iter().map(|d| d.comm.as_str()).collect();
    assert_eq!(comms, vec!["Refusing", "Broken", "Working"]);

    assert!(matches!(report.deliveries[0].outcome, DeliveryOutcome::Failed { .. }));
    assert!(matches!(report.deliveries[1].outcome, DeliveryOutcome::Error { .. }));
    assert!(matches!(report.deliveries[2].outcome, DeliveryOutcome::Delivered { .. }));

    for comm in [&refusing, &broken, &working] {
        assert_eq!(comm.sent().len(), 1);
    }
}

#[tokio::test]
async fn seen_items_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seen.json");
    let config = config_for(&["alpha"], &["log"]);

    {
        let store: Arc<dyn SeenStore> = Arc::new(FileSeenStore::new(&path).await.unwrap());
        let alpha = StaticSource::new("alpha", store.clone(), &["1", "2"]);
        let comm = RecordingComm::new("log");
        let engine = engine_for(&[&alpha], &[&comm], config.clone(), store);
        assert_eq!(engine.run_cycle().await.novel_count(), 2);
        engine.flush().await.unwrap();
    }

    let store: Arc<dyn SeenStore> = Arc::new(FileSeenStore::new(&path).await.unwrap());
    let alpha = StaticSource::new("alpha", store.clone(), &["1", "2"]);
    let comm = RecordingComm::new("log");
    let engine = engine_for(&[&alpha], &[&comm], config, store);

    assert_eq!(engine.run_cycle().await.novel_count(), 0);
    assert!(comm.sent().is_empty());
}

#[tokio::test]
async fn seeding_marks_without_notifying() {
    let store: Arc<dyn SeenStore> = Arc::new(MemorySeenStore::new());
    let alpha = StaticSource::new("alpha", store.clone(), &["1", "2"]);
    let beta = StaticSource::new("beta", store.clone(), &["x"]);
    let comm = RecordingComm::new("log");

    let engine = engine_for(
        &[&alpha, &beta],
        &[&comm],
        config_for(&["alpha", "beta"], &["log"]),
        store.clone(),
    );

    assert_eq!(engine.seed().await, 3);
    assert!(comm.sent().is_empty());
    assert_eq!(store.count("Alpha").await.unwrap(), 2);

    assert_eq!(engine.seed().await, 0, "seeding twice marks nothing new");
    assert_eq!(engine.run_cycle().await.novel_count(), 0);
}

#[tokio::test]
async fn startup_message_is_sent_only_when_configured() {
    let store: Arc<dyn SeenStore> = Arc::new(MemorySeenStore::new());
    let comm = RecordingComm::new("log");

    let engine = engine_for(&[], &[&comm], config_for(&[], &["log"]), store.clone());
    assert!(engine.announce_startup().await.is_empty());
    assert!(comm.sent().is_empty());

    let mut config = config_for(&[], &["log"]);
    config.server.message_strings.server_startup_msg_text = "Hunting started".to_string();
    let engine = engine_for(&[], &[&comm], config, store);
    engine.announce_startup().await;

    let sent = comm.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].msg, "Hunting started");
    assert_eq!(sent[0].title.as_deref(), Some("WebHunter"));
}
