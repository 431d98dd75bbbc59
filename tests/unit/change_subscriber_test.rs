//! Unit tests for the change subscriber: event delivery into the store,
//! dropping of malformed payloads, and release of the feed handle on close.

mod support;

use std::sync::Arc;

use markboard::managers::bookmark_store::BookmarkStore;
use markboard::managers::change_subscriber::ChangeSubscriber;
use markboard::services::backend::Backend;
use markboard::types::change::{FeedFilter, RawChange};
use serde_json::json;
use support::{bookmark, delete_of, ids, insert_of, settle, wait_until, ScriptedBackend};

fn filter() -> FeedFilter {
    FeedFilter::bookmarks_for("bookmarks-changes", "user-1")
}

async fn attach(backend: &Arc<ScriptedBackend>, store: &BookmarkStore) -> ChangeSubscriber {
    let dyn_backend: Arc<dyn Backend> = backend.clone();
    ChangeSubscriber::attach(dyn_backend, filter(), store.clone())
        .await
        .expect("feed should open")
}

#[tokio::test]
async fn test_insert_and_delete_events_reach_the_store() {
    let backend = ScriptedBackend::signed_in("user-1");
    let store = BookmarkStore::new();
    store.replace_all(vec![bookmark("1", 10)]);
    let _subscriber = attach(&backend, &store).await;

    backend.push(insert_of(&bookmark("2", 5)));
    wait_until(&store, |items| items.len() == 2).await;
    assert_eq!(ids(&store.snapshot()), vec!["2", "1"]);

    backend.push(delete_of("1"));
    wait_until(&store, |items| items.len() == 1).await;
    assert_eq!(ids(&store.snapshot()), vec!["2"]);
}

/// Validates: numeric ids on inserts and deletes reach the store as the same key.
#[tokio::test]
async fn test_numeric_ids_insert_then_delete() {
    let backend = ScriptedBackend::signed_in("user-1");
    let store = BookmarkStore::new();
    let _subscriber = attach(&backend, &store).await;

    backend.push(RawChange::insert(json!({
        "id": 2,
        "title": "Two",
        "url": "https://two.example",
        "created_at": "2024-01-02T00:00:00Z",
        "user_id": "user-1"
    })));
    wait_until(&store, |items| items.len() == 1).await;
    assert_eq!(ids(&store.snapshot()), vec!["2"]);

    backend.push(RawChange::delete(json!({"id": 2})));
    wait_until(&store, |items| items.is_empty()).await;
}

/// Validates: a malformed event is dropped and later events still apply.
#[tokio::test]
async fn test_malformed_events_are_dropped() {
    let backend = ScriptedBackend::signed_in("user-1");
    let store = BookmarkStore::new();
    let _subscriber = attach(&backend, &store).await;

    backend.push(RawChange::insert(json!({"id": "no-fields"})));
    backend.push(RawChange::delete(json!({})));
    backend.push(RawChange {
        kind: "UPDATE".to_string(),
        new_record: Some(json!({"id": "x"})),
        old_record: None,
    });
    backend.push(insert_of(&bookmark("ok", 1)));

    wait_until(&store, |items| !items.is_empty()).await;
    assert_eq!(ids(&store.snapshot()), vec!["ok"]);
}

/// Validates: teardown releases exactly one handle and stops store mutation.
#[tokio::test]
async fn test_close_releases_handle_once_and_stops_updates() {
    let backend = ScriptedBackend::signed_in("user-1");
    let store = BookmarkStore::new();
    let mut subscriber = attach(&backend, &store).await;
    let handle = subscriber.handle_id().map(str::to_string);
    assert!(subscriber.is_open());

    subscriber.close();
    subscriber.close();
    drop(subscriber);

    assert_eq!(backend.closed(), vec![handle.unwrap()]);
    assert_eq!(backend.open_feeds(), 0);

    backend.push(insert_of(&bookmark("late", 1)));
    settle().await;
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_drop_closes_the_feed() {
    let backend = ScriptedBackend::signed_in("user-1");
    let store = BookmarkStore::new();
    {
        let _subscriber = attach(&backend, &store).await;
        assert_eq!(backend.open_feeds(), 1);
    }
    assert_eq!(backend.count("close_change_feed"), 1);
    assert_eq!(backend.open_feeds(), 0);
}

#[tokio::test]
async fn test_attach_failure_is_returned() {
    let backend = ScriptedBackend::signed_in("user-1");
    backend.fail_feed();
    let dyn_backend: Arc<dyn Backend> = backend.clone();
    let result = ChangeSubscriber::attach(dyn_backend, filter(), BookmarkStore::new()).await;
    assert!(result.is_err());
    assert_eq!(backend.count("close_change_feed"), 0);
}
