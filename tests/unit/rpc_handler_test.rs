//! Unit tests for the RPC handler: every JSON-RPC method dispatched by
//! `handle_method`, driven through the same path as the `markboard-rpc`
//! binary, with a local backend in a temporary directory.

mod support;

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use markboard::app::Dashboard;
use markboard::rpc_handler::{build_backend, handle_method};
use markboard::types::config::{BackendConfig, ClientConfig};
use markboard::types::view::Route;
use support::{wait_until, RecordingNavigator};

/// Create a Dashboard over a local backend in a temp directory.
fn setup() -> (Dashboard, Arc<RecordingNavigator>, TempDir) {
    let tmp = TempDir::new().expect("Failed to create temp dir");
    let config = ClientConfig {
        backend: BackendConfig::Local {
            db_path: Some(tmp.path().join("data").join("test.db").to_string_lossy().to_string()),
        },
        ..ClientConfig::default()
    };
    let backend = build_backend(&config).expect("Failed to build backend");
    let nav = RecordingNavigator::new();
    let dashboard = Dashboard::with_realtime(backend, nav.clone(), &config.realtime);
    (dashboard, nav, tmp)
}

async fn signed_in() -> (Dashboard, Arc<RecordingNavigator>, TempDir) {
    let (dash, nav, tmp) = setup();
    handle_method(&dash, "auth.sign_in", &json!({"email": "me@example.com", "password": "pw"}))
        .await
        .unwrap();
    let mounted = handle_method(&dash, "dashboard.mount", &json!({})).await.unwrap();
    assert_eq!(mounted, json!({"state": "ready"}));
    (dash, nav, tmp)
}

// ─── Ping ───

#[tokio::test]
async fn test_ping() {
    let (dash, _nav, _tmp) = setup();
    let res = handle_method(&dash, "ping", &json!({})).await.unwrap();
    assert_eq!(res, json!({"pong": true}));
}

// ─── Unknown method ───

#[tokio::test]
async fn test_unknown_method_returns_error() {
    let (dash, _nav, _tmp) = setup();
    let res = handle_method(&dash, "nonexistent.method", &json!({})).await;
    assert!(res.unwrap_err().contains("unknown method"));
}

// ─── Auth ───

#[tokio::test]
async fn test_sign_in_requires_params() {
    let (dash, _nav, _tmp) = setup();
    let res = handle_method(&dash, "auth.sign_in", &json!({"email": "me@example.com"})).await;
    assert_eq!(res.unwrap_err(), "missing password");
}

#[tokio::test]
async fn test_sign_in_returns_identity() {
    let (dash, _nav, _tmp) = setup();
    let res = handle_method(&dash, "auth.sign_in", &json!({"email": "me@example.com", "password": "x"}))
        .await
        .unwrap();
    assert_eq!(res["email"], "me@example.com");
    assert!(res["id"].as_str().is_some());
}

#[tokio::test]
async fn test_mount_without_session_redirects() {
    let (dash, nav, _tmp) = setup();
    let res = handle_method(&dash, "dashboard.mount", &json!({})).await.unwrap();
    assert_eq!(res, json!({"state": "redirecting"}));
    assert_eq!(nav.routes(), vec![Route::Entry]);
}

#[tokio::test]
async fn test_logout_without_session_is_an_error() {
    let (dash, _nav, _tmp) = setup();
    let res = handle_method(&dash, "auth.logout", &json!({})).await;
    assert_eq!(res.unwrap_err(), "No active session");
}

// ─── Dashboard state and form ───

#[tokio::test]
async fn test_state_reports_user_and_subscription() {
    let (dash, _nav, _tmp) = signed_in().await;
    let state = handle_method(&dash, "dashboard.state", &json!({})).await.unwrap();
    assert_eq!(state["state"], "ready");
    assert_eq!(state["loading"], false);
    assert_eq!(state["user"]["email"], "me@example.com");
    assert!(state["subscription"].as_str().is_some());
}

#[tokio::test]
async fn test_form_setters_update_state() {
    let (dash, _nav, _tmp) = setup();
    handle_method(&dash, "form.set_title", &json!({"value": "Docs"})).await.unwrap();
    handle_method(&dash, "form.set_url", &json!({"value": "docs.rs"})).await.unwrap();

    let state = handle_method(&dash, "dashboard.state", &json!({})).await.unwrap();
    assert_eq!(state["form"], json!({"title": "Docs", "url": "docs.rs"}));
    assert_eq!(state["user"], json!(null));

    let res = handle_method(&dash, "form.set_url", &json!({})).await;
    assert_eq!(res.unwrap_err(), "missing value");
}

// ─── Bookmarks ───

#[tokio::test]
async fn test_add_list_delete_flow() {
    let (dash, _nav, _tmp) = signed_in().await;

    let added = handle_method(&dash, "bookmark.add", &json!({"title": "Rust", "url": "rust-lang.org"}))
        .await
        .unwrap();
    assert_eq!(added["submitted"], true);
    assert_eq!(added["bookmark"]["url"], "https://rust-lang.org");
    let id = added["bookmark"]["id"].as_str().unwrap().to_string();

    wait_until(dash.store(), |items| items.len() == 1).await;
    let list = handle_method(&dash, "bookmark.list", &json!({})).await.unwrap();
    assert_eq!(list[0]["id"], id.as_str());
    assert_eq!(list[0]["title"], "Rust");

    let deleted = handle_method(&dash, "bookmark.delete", &json!({"id": id})).await.unwrap();
    assert_eq!(deleted, json!({"ok": true}));
    wait_until(dash.store(), |items| items.is_empty()).await;
    let list = handle_method(&dash, "bookmark.list", &json!({})).await.unwrap();
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn test_add_with_empty_field_is_not_submitted() {
    let (dash, _nav, _tmp) = signed_in().await;
    let res = handle_method(&dash, "bookmark.add", &json!({"title": "only a title"}))
        .await
        .unwrap();
    assert_eq!(res, json!({"submitted": false}));
}

#[tokio::test]
async fn test_delete_requires_id() {
    let (dash, _nav, _tmp) = signed_in().await;
    let res = handle_method(&dash, "bookmark.delete", &json!({})).await;
    assert_eq!(res.unwrap_err(), "missing id");
}

#[tokio::test]
async fn test_logout_navigates_to_entry() {
    let (dash, nav, _tmp) = signed_in().await;
    let res = handle_method(&dash, "auth.logout", &json!({})).await.unwrap();
    assert_eq!(res, json!({"ok": true}));
    assert_eq!(nav.routes(), vec![Route::Entry]);

    let state = handle_method(&dash, "dashboard.state", &json!({})).await.unwrap();
    assert_eq!(state["state"], "redirecting");
    assert_eq!(state["user"], json!(null));
    assert_eq!(state["subscription"], json!(null));

    let res = handle_method(&dash, "bookmark.add", &json!({"title": "Rust", "url": "rust-lang.org"}))
        .await
        .unwrap();
    assert_eq!(res, json!({"submitted": false}));
}
