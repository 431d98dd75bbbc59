//! Unit tests for the Dashboard: mount lifecycle, the loading indicator,
//! command handlers (add, delete, logout) and teardown/rebind behaviour.
//!
//! Every test drives the dashboard against `ScriptedBackend`, which records
//! calls and lets the test push raw change events into open feeds.

mod support;

use std::sync::Arc;
use std::time::Duration;

use markboard::app::{AddOutcome, Dashboard};
use markboard::types::errors::{BackendError, DashboardError};
use markboard::types::view::{Route, ViewState};
use support::{
    bookmark, delete_of, ids, insert_of, settle, wait_until, RecordingNavigator, ScriptedBackend,
};

fn dashboard(backend: &Arc<ScriptedBackend>, nav: &Arc<RecordingNavigator>) -> Arc<Dashboard> {
    Arc::new(Dashboard::new(backend.clone(), nav.clone()))
}

async fn wait_for_view(dashboard: &Dashboard, state: ViewState) {
    let mut rx = dashboard.watch_view();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == state))
        .await
        .expect("view state not reached")
        .expect("view channel closed");
}

// ─── Mount ───

/// Validates: with no identity there is no fetch, no subscription, and a redirect.
#[tokio::test]
async fn test_mount_without_identity_redirects() {
    let backend = ScriptedBackend::signed_out();
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);

    assert_eq!(dash.mount().await, ViewState::Redirecting);

    assert_eq!(nav.routes(), vec![Route::Entry]);
    assert_eq!(backend.count("query_bookmarks"), 0);
    assert_eq!(backend.count("open_change_feed"), 0);
    assert!(dash.identity().is_none());
    assert!(dash.subscription_id().is_none());
}

#[tokio::test]
async fn test_identity_failure_is_treated_as_signed_out() {
    let backend = ScriptedBackend::signed_in("user-1");
    backend.fail_identity();
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);

    assert_eq!(dash.mount().await, ViewState::Redirecting);
    assert_eq!(nav.routes(), vec![Route::Entry]);
    assert_eq!(backend.count("query_bookmarks"), 0);
}

/// Validates: after mount the list mirrors the fetch result in created_at descending order.
#[tokio::test]
async fn test_mount_loads_bookmarks_and_opens_feed() {
    let backend = ScriptedBackend::signed_in("user-1");
    backend.set_rows(vec![bookmark("new", 300), bookmark("mid", 200), bookmark("old", 100)]);
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);

    assert_eq!(dash.mount().await, ViewState::Ready);

    assert!(!dash.is_loading());
    assert_eq!(ids(&dash.bookmarks()), vec!["new", "mid", "old"]);
    assert_eq!(dash.identity().map(|i| i.id), Some("user-1".to_string()));
    assert_eq!(backend.opened().len(), 1);
    assert_eq!(dash.subscription_id(), backend.opened().first().cloned());
    assert!(nav.routes().is_empty());
}

#[tokio::test]
async fn test_fetch_failure_still_reaches_ready_with_empty_list() {
    let backend = ScriptedBackend::signed_in("user-1");
    backend.fail_query();
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);

    assert_eq!(dash.mount().await, ViewState::Ready);
    assert!(dash.bookmarks().is_empty());
    assert_eq!(backend.count("open_change_feed"), 1);
}

#[tokio::test]
async fn test_feed_failure_keeps_fetched_list() {
    let backend = ScriptedBackend::signed_in("user-1");
    backend.set_rows(vec![bookmark("1", 1)]);
    backend.fail_feed();
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);

    assert_eq!(dash.mount().await, ViewState::Ready);
    assert_eq!(ids(&dash.bookmarks()), vec!["1"]);
    assert!(dash.subscription_id().is_none());
}

#[tokio::test]
async fn test_loading_indicator_shown_until_fetch_completes() {
    let backend = ScriptedBackend::signed_in("user-1");
    let gate = backend.gate_queries();
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);

    let mounting = tokio::spawn({
        let dash = dash.clone();
        async move { dash.mount().await }
    });
    wait_for_view(&dash, ViewState::Loading).await;
    assert!(dash.is_loading());

    gate.notify_one();
    assert_eq!(mounting.await.unwrap(), ViewState::Ready);
    assert!(!dash.is_loading());
}

#[tokio::test]
async fn test_teardown_during_fetch_discards_result_and_opens_no_feed() {
    let backend = ScriptedBackend::signed_in("user-1");
    backend.set_rows(vec![bookmark("1", 1)]);
    let gate = backend.gate_queries();
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);

    let mounting = tokio::spawn({
        let dash = dash.clone();
        async move { dash.mount().await }
    });
    wait_for_view(&dash, ViewState::Loading).await;

    dash.teardown();
    gate.notify_one();
    mounting.await.unwrap();

    assert!(dash.bookmarks().is_empty());
    assert_eq!(backend.count("open_change_feed"), 0);
    assert_eq!(dash.view_state(), ViewState::Unresolved);
    assert!(dash.identity().is_none());
}

// ─── Live updates ───

#[tokio::test]
async fn test_live_events_update_the_list() {
    let backend = ScriptedBackend::signed_in("user-1");
    backend.set_rows(vec![bookmark("1", 200)]);
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);
    dash.mount().await;

    backend.push(insert_of(&bookmark("2", 100)));
    wait_until(dash.store(), |items| items.len() == 2).await;
    assert_eq!(ids(&dash.bookmarks()), vec!["2", "1"]);

    backend.push(delete_of("1"));
    wait_until(dash.store(), |items| items.len() == 1).await;
    assert_eq!(ids(&dash.bookmarks()), vec!["2"]);
}

// ─── Add ───

#[tokio::test]
async fn test_add_with_empty_field_sends_nothing() {
    let backend = ScriptedBackend::signed_in("user-1");
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);
    dash.mount().await;

    dash.set_title("Docs");
    assert_eq!(dash.add_bookmark().await.unwrap(), AddOutcome::Skipped);

    dash.set_title("   ");
    dash.set_url("example.com");
    assert_eq!(dash.add_bookmark().await.unwrap(), AddOutcome::Skipped);

    assert_eq!(backend.count("insert_bookmark"), 0);
    assert_eq!(dash.form().url, "example.com");
}

#[tokio::test]
async fn test_add_without_session_is_skipped() {
    let backend = ScriptedBackend::signed_out();
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);

    dash.set_title("Docs");
    dash.set_url("example.com");
    assert_eq!(dash.add_bookmark().await.unwrap(), AddOutcome::Skipped);
    assert_eq!(backend.count("insert_bookmark"), 0);
}

/// Validates: the URL gets an https prefix, the form is cleared and the list waits for the feed.
#[tokio::test]
async fn test_add_normalizes_url_and_clears_form() {
    let backend = ScriptedBackend::signed_in("user-1");
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);
    dash.mount().await;

    dash.set_title("  Example  ");
    dash.set_url("example.com");
    let outcome = dash.add_bookmark().await.unwrap();

    let inserted = backend.inserted();
    assert_eq!(inserted.len(), 1);
    assert_eq!(inserted[0].url, "https://example.com");
    assert_eq!(inserted[0].title, "Example");
    assert_eq!(inserted[0].user_id, "user-1");
    assert!(matches!(outcome, AddOutcome::Submitted(ref b) if b.url == "https://example.com"));

    assert_eq!(dash.form().title, "");
    assert_eq!(dash.form().url, "");
    assert!(dash.bookmarks().is_empty());

    if let AddOutcome::Submitted(bookmark) = outcome {
        backend.push(insert_of(&bookmark));
        wait_until(dash.store(), |items| items.len() == 1).await;
    }
}

#[tokio::test]
async fn test_add_keeps_explicit_scheme() {
    let backend = ScriptedBackend::signed_in("user-1");
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);
    dash.mount().await;

    dash.set_title("Plain");
    dash.set_url("http://plain.example");
    dash.add_bookmark().await.unwrap();
    assert_eq!(backend.inserted()[0].url, "http://plain.example");
}

#[tokio::test]
async fn test_add_failure_still_clears_form() {
    let backend = ScriptedBackend::signed_in("user-1");
    backend.fail_insert();
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);
    dash.mount().await;

    dash.set_title("Docs");
    dash.set_url("docs.rs");
    let err = dash.add_bookmark().await.unwrap_err();

    assert!(matches!(err, DashboardError::Backend(BackendError::HttpError(400, _))));
    assert_eq!(dash.form().title, "");
    assert_eq!(dash.form().url, "");
    assert!(dash.bookmarks().is_empty());
}

// ─── Delete ───

/// Validates: delete asks the backend and leaves reconciliation to the feed.
#[tokio::test]
async fn test_delete_does_not_touch_the_store() {
    let backend = ScriptedBackend::signed_in("user-1");
    backend.set_rows(vec![bookmark("1", 2), bookmark("2", 1)]);
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);
    dash.mount().await;

    dash.delete_bookmark("2").await.unwrap();
    assert_eq!(backend.count("delete_bookmark"), 1);
    assert_eq!(ids(&dash.bookmarks()), vec!["1", "2"]);

    backend.push(delete_of("2"));
    wait_until(dash.store(), |items| items.len() == 1).await;
    assert_eq!(ids(&dash.bookmarks()), vec!["1"]);
}

#[tokio::test]
async fn test_delete_failure_is_returned() {
    let backend = ScriptedBackend::signed_in("user-1");
    backend.set_rows(vec![bookmark("1", 1)]);
    backend.fail_delete();
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);
    dash.mount().await;

    let err = dash.delete_bookmark("1").await.unwrap_err();
    assert!(matches!(err, DashboardError::Backend(_)));
    assert_eq!(dash.bookmarks().len(), 1);
}

#[tokio::test]
async fn test_delete_without_session_is_rejected() {
    let backend = ScriptedBackend::signed_out();
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);

    let err = dash.delete_bookmark("1").await.unwrap_err();
    assert!(matches!(err, DashboardError::NoSession));
    assert_eq!(backend.count("delete_bookmark"), 0);
}

// ─── Logout ───

#[tokio::test]
async fn test_logout_navigates_and_closes_feed() {
    let backend = ScriptedBackend::signed_in("user-1");
    backend.set_rows(vec![bookmark("1", 1)]);
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);
    dash.mount().await;

    dash.logout().await.unwrap();

    assert_eq!(nav.routes(), vec![Route::Entry]);
    assert_eq!(backend.count("sign_out"), 1);
    assert_eq!(backend.closed().len(), 1);
    assert!(dash.identity().is_none());
    assert!(dash.subscription_id().is_none());
    assert_eq!(dash.view_state(), ViewState::Redirecting);

    backend.push(insert_of(&bookmark("late", 5)));
    settle().await;
    assert_eq!(ids(&dash.bookmarks()), vec!["1"]);
}

#[tokio::test]
async fn test_logout_navigates_even_when_sign_out_fails() {
    let backend = ScriptedBackend::signed_in("user-1");
    backend.fail_sign_out();
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);
    dash.mount().await;

    let err = dash.logout().await.unwrap_err();
    assert!(matches!(err, DashboardError::Backend(BackendError::NetworkError(_))));
    assert_eq!(nav.routes(), vec![Route::Entry]);
    assert_eq!(backend.closed().len(), 1);
}

#[tokio::test]
async fn test_logout_without_session_is_rejected() {
    let backend = ScriptedBackend::signed_out();
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);

    assert!(matches!(dash.logout().await, Err(DashboardError::NoSession)));
    assert_eq!(backend.count("sign_out"), 0);
    assert!(nav.routes().is_empty());
}

// ─── Teardown and rebind ───

/// Validates: teardown closes exactly one handle and later events are not applied.
#[tokio::test]
async fn test_teardown_is_idempotent_and_stops_updates() {
    let backend = ScriptedBackend::signed_in("user-1");
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);
    dash.mount().await;
    let handle = dash.subscription_id();

    dash.teardown();
    dash.teardown();

    assert_eq!(backend.closed().len(), 1);
    assert_eq!(backend.closed().first().cloned(), handle);

    backend.push(insert_of(&bookmark("late", 1)));
    settle().await;
    assert!(dash.bookmarks().is_empty());
}

/// Validates: a torn-down view no longer reports ready and sends no writes.
#[tokio::test]
async fn test_teardown_leaves_view_unmounted_and_rejects_commands() {
    let backend = ScriptedBackend::signed_in("user-1");
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);
    assert_eq!(dash.mount().await, ViewState::Ready);

    dash.teardown();
    assert_eq!(dash.view_state(), ViewState::Unresolved);
    assert!(dash.is_loading());
    assert!(dash.identity().is_none());

    dash.set_title("Late");
    dash.set_url("late.example");
    assert_eq!(dash.add_bookmark().await.unwrap(), AddOutcome::Skipped);
    assert!(matches!(
        dash.delete_bookmark("1").await,
        Err(DashboardError::NoSession)
    ));
    assert_eq!(backend.count("insert_bookmark"), 0);
    assert_eq!(backend.count("delete_bookmark"), 0);
}

#[tokio::test]
async fn test_remount_closes_previous_feed_first() {
    let backend = ScriptedBackend::signed_in("user-1");
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);
    dash.mount().await;
    dash.mount().await;

    let calls: Vec<String> = backend
        .calls()
        .into_iter()
        .filter(|c| c.ends_with("change_feed"))
        .collect();
    assert_eq!(calls, vec!["open_change_feed", "close_change_feed", "open_change_feed"]);
    assert_eq!(backend.open_feeds(), 1);
}

#[tokio::test]
async fn test_rebind_moves_the_feed_to_the_new_backend() {
    let first = ScriptedBackend::signed_in("user-1");
    let second = ScriptedBackend::signed_in("user-1");
    second.set_rows(vec![bookmark("fresh", 1)]);
    let nav = RecordingNavigator::new();
    let dash = dashboard(&first, &nav);
    dash.mount().await;

    assert_eq!(dash.rebind(second.clone()).await, ViewState::Ready);

    assert_eq!(first.closed().len(), 1);
    assert_eq!(first.open_feeds(), 0);
    assert_eq!(second.opened().len(), 1);
    assert_eq!(ids(&dash.bookmarks()), vec!["fresh"]);

    // Events on the old backend no longer reach the list.
    first.push(insert_of(&bookmark("stale", 2)));
    settle().await;
    assert_eq!(ids(&dash.bookmarks()), vec!["fresh"]);
}

#[tokio::test]
async fn test_dropping_the_dashboard_closes_the_feed() {
    let backend = ScriptedBackend::signed_in("user-1");
    let nav = RecordingNavigator::new();
    let dash = dashboard(&backend, &nav);
    dash.mount().await;

    drop(dash);
    assert_eq!(backend.closed().len(), 1);
}
