//! Tests for session observation streams.

use futures::StreamExt;
use std::sync::Arc;
use strategy_squares::{
    GameStatus, MemoryLedger, MemoryStore, ObserveError, Player, RecordStore, SessionManager,
    SessionRecord,
};

fn setup() -> (SessionManager, MemoryStore) {
    let store = MemoryStore::new();
    let ledger = MemoryLedger::new();
    let manager = SessionManager::new(Arc::new(store.clone()), Arc::new(ledger));
    (manager, store)
}

fn alice() -> Player {
    Player::new("alice-uid".to_string(), "Alice".to_string())
}

fn bob() -> Player {
    Player::new("bob-uid".to_string(), "Bob".to_string())
}

#[tokio::test]
async fn test_attach_delivers_current_snapshot_immediately() {
    let (manager, _) = setup();
    let session_id = manager.create_session(alice()).await.expect("Create");

    let mut updates = manager.observe(&session_id);
    let record = updates.recv().await.expect("Delivery").expect("Snapshot");
    assert_eq!(record.session_id, session_id);
    assert_eq!(record.status, GameStatus::Waiting);
}

#[tokio::test]
async fn test_deliveries_follow_write_order() {
    let (manager, _) = setup();
    let session_id = manager.create_session(alice()).await.expect("Create");
    let mut updates = manager.observe(&session_id);

    manager.join_session(&session_id, bob()).await.expect("Join");
    manager.make_move(&session_id, 0, "alice-uid").await.expect("Move");

    let first = updates.recv().await.expect("Delivery").expect("Snapshot");
    assert_eq!(first.status, GameStatus::Waiting);

    let second = updates.recv().await.expect("Delivery").expect("Snapshot");
    assert_eq!(second.status, GameStatus::InProgress);
    assert_eq!(second.turn_holder.as_deref(), Some("alice-uid"));

    let third = updates.recv().await.expect("Delivery").expect("Snapshot");
    assert_eq!(third.turn_holder.as_deref(), Some("bob-uid"));
}

#[tokio::test]
async fn test_observer_is_a_stream() {
    let (manager, _) = setup();
    let session_id = manager.create_session(alice()).await.expect("Create");

    let updates = manager.observe(&session_id);
    manager.join_session(&session_id, bob()).await.expect("Join");

    let statuses: Vec<GameStatus> = updates
        .take(2)
        .map(|item| item.expect("Snapshot").status)
        .collect()
        .await;
    assert_eq!(statuses, vec![GameStatus::Waiting, GameStatus::InProgress]);
}

#[tokio::test]
async fn test_deleted_record_is_skipped() {
    let (manager, store) = setup();
    let session_id = manager.create_session(alice()).await.expect("Create");
    let mut updates = manager.observe(&session_id);

    // Drain the attach snapshot.
    updates.recv().await.expect("Delivery").expect("Snapshot");

    // Owner leaves: the record is deleted, which observers skip. A new
    // session written under the same key is the next delivery.
    manager.leave_session(&session_id, "alice-uid").await.expect("Leave");
    let replacement = SessionRecord::waiting(session_id.clone(), bob());
    let value = serde_json::to_value(&replacement).expect("Encodable record");
    store.set(&session_id, value).await.expect("Store write");

    let record = updates.recv().await.expect("Delivery").expect("Snapshot");
    assert_eq!(record.player_a.id, "bob-uid");
}

#[tokio::test]
async fn test_undecodable_snapshot_is_skipped() {
    let (manager, store) = setup();
    let session_id = manager.create_session(alice()).await.expect("Create");
    let mut updates = manager.observe(&session_id);
    updates.recv().await.expect("Delivery").expect("Snapshot");

    store
        .set(&session_id, serde_json::json!({ "bogus": true }))
        .await
        .expect("Store write");
    manager.join_session(&session_id, bob()).await.expect("Join");

    // The malformed document is dropped; the join snapshot comes through.
    let record = updates.recv().await.expect("Delivery").expect("Snapshot");
    assert_eq!(record.status, GameStatus::InProgress);
}

#[tokio::test]
async fn test_drop_detaches_listener() {
    let (manager, store) = setup();
    let session_id = manager.create_session(alice()).await.expect("Create");

    let updates = manager.observe(&session_id);
    assert_eq!(store.watcher_count(&session_id), 1);

    drop(updates);
    assert_eq!(store.watcher_count(&session_id), 0);
}

#[tokio::test]
async fn test_store_failure_terminates_stream() {
    let (manager, store) = setup();
    let session_id = manager.create_session(alice()).await.expect("Create");
    let mut updates = manager.observe(&session_id);
    updates.recv().await.expect("Delivery").expect("Snapshot");

    store.fail_watchers(&session_id, "permission revoked");

    let err = updates.recv().await.expect("Delivery").expect_err("Failure");
    assert!(matches!(err, ObserveError::ObservationFailed(_)));
    assert!(updates.recv().await.is_none());
}

#[tokio::test]
async fn test_failure_does_not_affect_other_sessions() {
    let (manager, store) = setup();
    let failing_id = manager.create_session(alice()).await.expect("Create");
    let healthy_id = manager.create_session(bob()).await.expect("Create");

    let mut failing = manager.observe(&failing_id);
    let mut healthy = manager.observe(&healthy_id);
    failing.recv().await.expect("Delivery").expect("Snapshot");
    healthy.recv().await.expect("Delivery").expect("Snapshot");

    store.fail_watchers(&failing_id, "permission revoked");
    manager
        .send_message(&healthy_id, "bob-uid", "Bob", "still here")
        .await
        .expect("Chat");

    assert!(failing.recv().await.expect("Delivery").is_err());
    let record = healthy.recv().await.expect("Delivery").expect("Snapshot");
    assert_eq!(record.messages.len(), 1);
}

#[tokio::test]
async fn test_two_observers_see_the_same_writes() {
    let (manager, _) = setup();
    let session_id = manager.create_session(alice()).await.expect("Create");

    let mut first = manager.observe(&session_id);
    let mut second = manager.observe(&session_id);
    manager.join_session(&session_id, bob()).await.expect("Join");

    for updates in [&mut first, &mut second] {
        let attach = updates.recv().await.expect("Delivery").expect("Snapshot");
        assert_eq!(attach.status, GameStatus::Waiting);
        let joined = updates.recv().await.expect("Delivery").expect("Snapshot");
        assert_eq!(joined.status, GameStatus::InProgress);
    }
}
