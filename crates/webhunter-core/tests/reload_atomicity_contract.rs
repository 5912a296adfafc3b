//! Contract Test: Reload Atomicity
//!
//! Constraints verified:
//! - When every component accepts, the new snapshot becomes current
//! - When exactly one rejects, the snapshot after reload equals the one before
//! - The rejecting components are named in the error and the event
//! - A component that cannot read its fragment counts as a rejection
//! - An invalid snapshot is refused before any component sees it

mod common;

use common::*;
use std::sync::Arc;
use webhunter_core::{
    ConfigHandle, EngineEvent, Error, MemorySeenStore, PollEngine, SeenStore, WebHunterConfig,
};

struct Fixture {
    alpha: StaticSource,
    beta: StaticSource,
    push: RecordingComm,
    mail: RecordingComm,
    engine: PollEngine,
    events: tokio::sync::mpsc::Receiver<EngineEvent>,
}

fn fixture() -> Fixture {
    let store: Arc<dyn SeenStore> = Arc::new(MemorySeenStore::new());
    let alpha = StaticSource::new("alpha", store.clone(), &["1"]);
    let beta = StaticSource::new("beta", store.clone(), &["x"]);
    let push = RecordingComm::new("push");
    let mail = RecordingComm::new("mail");

    let (engine, events) = PollEngine::new(
        vec![alpha.boxed(), beta.boxed()],
        vec![push.boxed(), mail.boxed()],
        ConfigHandle::new(config_for(&["alpha", "beta"], &["push", "mail"])),
        store,
    );

    Fixture {
        alpha,
        beta,
        push,
        mail,
        engine,
        events,
    }
}

fn changed_config() -> WebHunterConfig {
    let mut config = config_for(&["alpha", "beta"], &["push", "mail"]);
    config.server.simulate = true;
    config.server.message_strings.default_title = "Changed".to_string();
    config
}

#[tokio::test]
async fn accepted_reload_becomes_current() {
    let f = fixture();

    f.engine.reload(changed_config()).await.unwrap();

    assert_eq!(*f.engine.config().current(), changed_config());
    assert_eq!(f.alpha.reload_calls(), 1);
    assert_eq!(f.beta.reload_calls(), 1);
}

#[tokio::test]
async fn one_rejection_leaves_snapshot_unchanged() {
    let mut f = fixture();
    let before = f.engine.config().current();
    f.beta.accept_reload(false);

    let result = f.engine.reload(changed_config()).await;

    match result {
        Err(Error::ReloadRejected { components }) => {
            assert_eq!(components, vec!["Beta".to_string()]);
        }
        other => panic!("expected ReloadRejected, got {:?}", other),
    }
    assert_eq!(*f.engine.config().current(), *before);

    // Every component was still asked
    assert_eq!(f.alpha.reload_calls(), 1);
    assert_eq!(f.beta.reload_calls(), 1);

    let mut rejected = None;
    while let Ok(event) = f.events.try_recv() {
        if let EngineEvent::ReloadRejected { components } = event {
            rejected = Some(components);
        }
    }
    assert_eq!(rejected, Some(vec!["Beta".to_string()]));
}

#[tokio::test]
async fn unreadable_fragment_counts_as_rejection() {
    let f = fixture();
    let before = f.engine.config().current();
    f.mail.error_on_reload(true);
    f.push.accept_reload(false);

    match f.engine.reload(changed_config()).await {
        Err(Error::ReloadRejected { components }) => {
            assert_eq!(components, vec!["Push".to_string(), "Mail".to_string()]);
        }
        other => panic!("expected ReloadRejected, got {:?}", other),
    }
    assert_eq!(*f.engine.config().current(), *before);
}

#[tokio::test]
async fn invalid_snapshot_never_reaches_components() {
    let f = fixture();
    let mut invalid = changed_config();
    invalid.server.poll_time_min = 0;

    assert!(matches!(
        f.engine.reload(invalid).await,
        Err(Error::Config(_))
    ));
    assert_eq!(f.alpha.reload_calls(), 0);
}

#[tokio::test]
async fn rejected_reload_keeps_old_behavior() {
    let f = fixture();
    f.alpha.accept_reload(false);

    // The new snapshot would switch to simulate mode; it must not take effect
    let _ = f.engine.reload(changed_config()).await;
    f.engine.run_cycle().await;

    assert_eq!(f.push.sent().len(), 1);
    assert_eq!(f.push.sent()[0].title.as_deref(), Some("New items found"));
}

#[tokio::test]
async fn concurrent_reloads_are_serialized() {
    let f = fixture();
    let engine = Arc::new(f.engine);

    let mut first = changed_config();
    first.server.poll_time_min = 100;
    first.server.poll_time_max = 200;
    let mut second = changed_config();
    second.server.poll_time_min = 300;
    second.server.poll_time_max = 400;

    let (a, b) = tokio::join!(engine.reload(first.clone()), engine.reload(second.clone()));
    a.unwrap();
    b.unwrap();

    let current = engine.config().current();
    assert!(*current == first || *current == second);
}
