//! Tests for the in-process record store contract.

use serde_json::json;
use strategy_squares::{MemoryStore, RecordStore};

#[tokio::test]
async fn test_get_set_delete_roundtrip() {
    let store = MemoryStore::new();

    assert_eq!(store.get("ABCDEF").await.expect("Read"), None);

    store.set("ABCDEF", json!({ "n": 1 })).await.expect("Write");
    assert_eq!(store.get("ABCDEF").await.expect("Read"), Some(json!({ "n": 1 })));

    store.set("ABCDEF", json!({ "n": 2 })).await.expect("Write");
    assert_eq!(store.get("ABCDEF").await.expect("Read"), Some(json!({ "n": 2 })));

    store.delete("ABCDEF").await.expect("Delete");
    assert_eq!(store.get("ABCDEF").await.expect("Read"), None);
}

#[tokio::test]
async fn test_delete_of_absent_key_is_ok() {
    let store = MemoryStore::new();
    store.delete("ABCDEF").await.expect("Delete");
}

#[tokio::test]
async fn test_subscribe_to_absent_key_delivers_none() {
    let store = MemoryStore::new();
    let mut watch = store.subscribe("ABCDEF");
    assert_eq!(watch.recv().await.expect("Delivery").expect("Event"), None);
}

#[tokio::test]
async fn test_subscribe_delivers_writes_in_order() {
    let store = MemoryStore::new();
    store.set("ABCDEF", json!(1)).await.expect("Write");

    let mut watch = store.subscribe("ABCDEF");
    store.set("ABCDEF", json!(2)).await.expect("Write");
    store.delete("ABCDEF").await.expect("Delete");

    assert_eq!(watch.recv().await.expect("Delivery").expect("Event"), Some(json!(1)));
    assert_eq!(watch.recv().await.expect("Delivery").expect("Event"), Some(json!(2)));
    assert_eq!(watch.recv().await.expect("Delivery").expect("Event"), None);
}

#[tokio::test]
async fn test_subscriptions_are_per_key() {
    let store = MemoryStore::new();
    let mut watch = store.subscribe("ABCDEF");
    assert_eq!(watch.recv().await.expect("Delivery").expect("Event"), None);

    store.set("OTHERK", json!("other")).await.expect("Write");
    store.set("ABCDEF", json!("mine")).await.expect("Write");

    // The write to the other key never reaches this watch.
    assert_eq!(
        watch.recv().await.expect("Delivery").expect("Event"),
        Some(json!("mine"))
    );
}

#[tokio::test]
async fn test_clones_share_the_backing_map() {
    let store = MemoryStore::new();
    let clone = store.clone();

    store.set("ABCDEF", json!("shared")).await.expect("Write");
    assert_eq!(
        clone.get("ABCDEF").await.expect("Read"),
        Some(json!("shared"))
    );
}

#[tokio::test]
async fn test_dropped_watcher_is_pruned_on_next_write() {
    let store = MemoryStore::new();
    let watch = store.subscribe("ABCDEF");
    let second = store.subscribe("ABCDEF");
    assert_eq!(store.watcher_count("ABCDEF"), 2);

    drop(watch);
    assert_eq!(store.watcher_count("ABCDEF"), 1);
    drop(second);
    assert_eq!(store.watcher_count("ABCDEF"), 0);
}
