//! Integration tests for the credential manager's make-before-break refresh.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use teleport_autoreviewer::health::HealthState;
use teleport_autoreviewer::identity::manager::{spawn_refresh_task, CredentialManager};
use teleport_autoreviewer::plane::Connector;
use teleport_autoreviewer::AppError;

use super::test_helpers::{
    eventually, start_manager, writable_identity, FakeConnector, FakePlane, Journal,
};

#[tokio::test]
async fn start_publishes_first_generation_and_marks_healthy() {
    let journal = Arc::new(Journal::default());
    let (manager, connector, health) = start_manager(&journal, vec![]).await;

    let current = manager.current();
    assert_eq!(current.generation(), 1);
    assert_eq!(connector.connect_count(), 1);
    assert_eq!(current.credential().fingerprint().len(), 64);

    let snap = health.snapshot();
    assert!(snap.is_healthy());
    assert!(snap.last_refresh.is_some());
}

#[tokio::test]
async fn start_fails_when_identity_is_missing() {
    let journal = Arc::new(Journal::default());
    let dir = tempfile::tempdir().expect("tempdir");
    let connector = FakeConnector::new(&journal, vec![]);
    let health = Arc::new(HealthState::new());

    let result = CredentialManager::start(
        dir.path().join("missing"),
        connector as Arc<dyn Connector>,
        Arc::clone(&health),
    )
    .await;

    assert!(matches!(result, Err(AppError::Credential(_))));
    assert!(!health.snapshot().is_healthy());
}

#[tokio::test]
async fn start_fails_when_plane_is_unreachable() {
    let journal = Arc::new(Journal::default());
    let connector = FakeConnector::new(&journal, vec![]);
    connector.set_failing(true);

    let result = CredentialManager::start(
        super::test_helpers::fixture_identity(),
        connector as Arc<dyn Connector>,
        Arc::new(HealthState::new()),
    )
    .await;

    assert!(matches!(result, Err(AppError::Connection(_))));
}

#[tokio::test]
async fn refresh_swaps_connection_and_closes_old_after_new_is_live() {
    let journal = Arc::new(Journal::default());
    let p1 = FakePlane::new("p1", &journal);
    let p2 = FakePlane::new("p2", &journal);
    let (manager, _connector, health) =
        start_manager(&journal, vec![Arc::clone(&p1), Arc::clone(&p2)]).await;
    let before = health.snapshot().last_refresh.expect("refreshed at start");

    let held = manager.current();
    let next = manager.refresh().await.expect("refresh");

    assert_eq!(next.generation(), 2);
    assert_eq!(manager.current().generation(), 2);
    assert!(p1.is_closed());
    assert!(!p2.is_closed());
    assert_eq!(
        journal.entries(),
        ["connect:p1", "connect:p2", "close:p1"],
        "new connection established before the old one is closed"
    );

    // A context taken before the swap stays internally coherent.
    assert_eq!(held.generation(), 1);
    assert!(held.established_at() <= next.established_at());

    let snap = health.snapshot();
    assert!(snap.is_healthy());
    assert!(snap.last_refresh.expect("refreshed") >= before);
}

#[tokio::test]
async fn refresh_reloads_unchanged_identity_anyway() {
    let journal = Arc::new(Journal::default());
    let (manager, connector, _health) = start_manager(&journal, vec![]).await;
    let first = manager.current().credential().fingerprint().to_owned();

    let next = manager.refresh().await.expect("refresh");

    assert_eq!(connector.connect_count(), 2);
    assert_eq!(next.credential().fingerprint(), first);
    assert!(connector.plane(0).is_closed());
}

#[tokio::test]
async fn refresh_picks_up_rotated_identity() {
    let journal = Arc::new(Journal::default());
    let dir = tempfile::tempdir().expect("tempdir");
    let path = writable_identity(dir.path());
    let connector = FakeConnector::new(&journal, vec![]);
    let manager = CredentialManager::start(
        &path,
        Arc::clone(&connector) as Arc<dyn Connector>,
        Arc::new(HealthState::new()),
    )
    .await
    .expect("start");
    let first = manager.current().credential().fingerprint().to_owned();

    let original = std::fs::read_to_string(&path).expect("read identity");
    std::fs::write(&path, format!("# reissued\n{original}")).expect("rotate identity");
    let next = manager.refresh().await.expect("refresh");

    assert_ne!(next.credential().fingerprint(), first);
    assert_eq!(manager.identity_path(), path.as_path());
}

#[tokio::test]
async fn unreadable_identity_keeps_current_connection() {
    let journal = Arc::new(Journal::default());
    let dir = tempfile::tempdir().expect("tempdir");
    let path = writable_identity(dir.path());
    let connector = FakeConnector::new(&journal, vec![]);
    let health = Arc::new(HealthState::new());
    let manager = CredentialManager::start(
        &path,
        Arc::clone(&connector) as Arc<dyn Connector>,
        Arc::clone(&health),
    )
    .await
    .expect("start");

    std::fs::write(&path, "not an identity").expect("corrupt identity");
    let result = manager.refresh().await;

    assert!(matches!(result, Err(AppError::Credential(_))));
    assert_eq!(manager.current().generation(), 1);
    assert_eq!(connector.connect_count(), 1);
    assert!(!connector.plane(0).is_closed());

    let snap = health.snapshot();
    assert!(!snap.identity_valid);
    assert!(snap.connected);
    assert!(!snap.is_healthy());
}

#[tokio::test]
async fn connect_failure_keeps_current_connection() {
    let journal = Arc::new(Journal::default());
    let (manager, connector, health) = start_manager(&journal, vec![]).await;

    connector.set_failing(true);
    let result = manager.refresh().await;

    assert!(matches!(result, Err(AppError::Connection(_))));
    assert_eq!(manager.current().generation(), 1);
    assert!(!connector.plane(0).is_closed());
    let snap = health.snapshot();
    assert!(!snap.connected);
    assert!(!snap.identity_valid);
}

#[tokio::test]
async fn recovery_after_failed_refresh_restores_health() {
    let journal = Arc::new(Journal::default());
    let (manager, connector, health) = start_manager(&journal, vec![]).await;

    connector.set_failing(true);
    assert!(manager.refresh().await.is_err());
    connector.set_failing(false);
    let next = manager.refresh().await.expect("refresh");

    assert_eq!(next.generation(), 2);
    assert!(health.snapshot().is_healthy());
}

#[tokio::test]
async fn updates_mailbox_keeps_only_latest_context() {
    let journal = Arc::new(Journal::default());
    let (manager, _connector, _health) = start_manager(&journal, vec![]).await;
    let mut updates = manager.updates();
    assert!(!updates.has_changed().expect("sender alive"));

    manager.refresh().await.expect("refresh 2");
    manager.refresh().await.expect("refresh 3");

    updates.changed().await.expect("changed");
    assert_eq!(updates.borrow_and_update().generation(), 3);
    assert!(!updates.has_changed().expect("sender alive"));
}

#[tokio::test]
async fn concurrent_refreshes_are_serialized() {
    let journal = Arc::new(Journal::default());
    let (manager, _connector, _health) = start_manager(&journal, vec![]).await;

    let (a, b) = tokio::join!(manager.refresh(), manager.refresh());
    let mut generations = [
        a.expect("refresh a").generation(),
        b.expect("refresh b").generation(),
    ];
    generations.sort_unstable();

    assert_eq!(generations, [2, 3]);
    assert_eq!(manager.current().generation(), 3);
}

#[tokio::test]
async fn refresh_task_runs_on_interval_until_cancelled() {
    let journal = Arc::new(Journal::default());
    let (manager, _connector, _health) = start_manager(&journal, vec![]).await;
    let ct = CancellationToken::new();

    let handle = spawn_refresh_task(Arc::clone(&manager), Duration::from_millis(50), ct.clone());
    assert!(eventually(|| manager.current().generation() >= 3).await);

    ct.cancel();
    handle.await.expect("refresh task joins");
    let settled = manager.current().generation();
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(manager.current().generation(), settled);
}

#[tokio::test]
async fn refresh_task_survives_failures() {
    let journal = Arc::new(Journal::default());
    let (manager, connector, health) = start_manager(&journal, vec![]).await;
    let ct = CancellationToken::new();
    connector.set_failing(true);

    let handle = spawn_refresh_task(Arc::clone(&manager), Duration::from_millis(30), ct.clone());
    assert!(eventually(|| !health.snapshot().connected).await);
    assert!(!handle.is_finished());

    connector.set_failing(false);
    assert!(eventually(|| health.snapshot().is_healthy()).await);
    assert!(manager.current().generation() >= 2);

    ct.cancel();
    handle.await.expect("refresh task joins");
}

#[tokio::test]
async fn refresh_task_accepts_oversized_interval() {
    let journal = Arc::new(Journal::default());
    let (manager, _connector, _health) = start_manager(&journal, vec![]).await;
    let ct = CancellationToken::new();

    let handle = spawn_refresh_task(Arc::clone(&manager), Duration::MAX, ct.clone());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished());
    assert_eq!(manager.current().generation(), 1);

    ct.cancel();
    handle.await.expect("refresh task joins without panicking");
}
