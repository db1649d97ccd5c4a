//! Operator endpoint integration tests.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use keyshop_core::{Key, KeyStatus, UserId};
use keyshop_service::{HttpKeySource, StoreKeySource};
use keyshop_store::{RocksStore, Store};

/// A second deployment's store to sync from.
fn upstream_store() -> (TempDir, Arc<RocksStore>) {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(RocksStore::open(dir.path()).unwrap());
    (dir, store)
}

fn admin_post(harness: &TestHarness, url: &str) -> axum_test::TestRequest {
    let (name, value) = TestHarness::admin_key();
    harness.server.post(url).add_header(name, value)
}

/// Sell, activate and bind a key for `owner`. Expects no other stock.
fn bound_key(harness: &TestHarness, code: &str, owner: &UserId) -> Key {
    harness.stock(code, &[]);
    harness.fund(owner, 10_000);
    let claim = harness.store.claim_key("forest", owner, 10_000).unwrap();
    assert_eq!(claim.key.code, code);
    harness.store.activate_key(code, owner).unwrap();
    let (key, bound) = harness.store.bind_hwid(code, "HWID-1").unwrap();
    assert!(bound);
    key
}

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
async fn admin_routes_require_credentials() {
    let harness = TestHarness::new();

    let response = harness.server.get("/v1/admin/keys/pending").await;

    response.assert_status_unauthorized();
    assert_eq!(response.json::<Value>()["code"], "unauthenticated");
}

#[tokio::test]
async fn wrong_admin_key_is_rejected() {
    let harness = TestHarness::new();
    let (name, _) = TestHarness::admin_key();

    harness
        .server
        .get("/v1/admin/keys/pending")
        .add_header(name, axum::http::HeaderValue::from_static("not-the-key"))
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn regular_users_are_forbidden() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/admin/keys/pending")
        .add_header(TestHarness::authorization(), harness.user_auth())
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["code"], "forbidden");
}

#[tokio::test]
async fn admin_role_token_is_accepted() {
    let harness = TestHarness::new();

    harness
        .server
        .get("/v1/admin/keys/pending")
        .add_header(TestHarness::authorization(), TestHarness::admin_jwt_auth())
        .await
        .assert_status_ok();
}

// ============================================================================
// Provisioning and export
// ============================================================================

#[tokio::test]
async fn provisioning_skips_existing_codes() {
    let harness = TestHarness::new();
    harness.stock("KEY-0001", &[]);

    let response = admin_post(&harness, "/v1/admin/keys")
        .json(&json!({
            "keys": [
                { "code": "KEY-0001", "script_code": "dup" },
                { "code": "KEY-0002", "script_code": "print(2)", "maps": ["forest"] },
            ]
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["inserted"], 1);
    assert_eq!(body["skipped"], 1);

    let original = harness.store.get_key_by_code("KEY-0001").unwrap().unwrap();
    assert_eq!(original.script_code, "loadstring('KEY-0001')");
    let added = harness.store.get_key_by_code("KEY-0002").unwrap().unwrap();
    assert_eq!(added.status, KeyStatus::Pending);
    assert!(added.maps.contains("forest"));
}

#[tokio::test]
async fn provisioning_rejects_blank_codes() {
    let harness = TestHarness::new();

    let empty = admin_post(&harness, "/v1/admin/keys")
        .json(&json!({ "keys": [] }))
        .await;
    empty.assert_status_bad_request();

    let blank = admin_post(&harness, "/v1/admin/keys")
        .json(&json!({ "keys": [{ "code": "  ", "script_code": "x" }] }))
        .await;
    blank.assert_status_bad_request();
    assert_eq!(blank.json::<Value>()["code"], "validation");

    assert!(harness.store.list_pending_keys().unwrap().is_empty());
}

#[tokio::test]
async fn export_lists_only_unclaimed_unbound_stock() {
    let harness = TestHarness::new();
    bound_key(&harness, "KEY-SOLD", &UserId::generate());
    harness.stock("KEY-FREE", &["forest"]);

    let (name, value) = TestHarness::admin_key();
    let body: Value = harness
        .server
        .get("/v1/admin/keys/pending")
        .add_header(name, value)
        .await
        .json();

    assert_eq!(
        body,
        json!({
            "keys": [{
                "code": "KEY-FREE",
                "script_code": "loadstring('KEY-FREE')",
                "maps": ["forest"],
            }]
        })
    );
}

// ============================================================================
// Sync
// ============================================================================

#[tokio::test]
async fn sync_from_store_is_idempotent() {
    let (_dir, upstream) = upstream_store();
    for code in ["UP-1", "UP-2"] {
        upstream
            .insert_key(&Key::pending(code, format!("print('{code}')"), Vec::new()))
            .unwrap();
    }
    let upstream_ids: Vec<_> = upstream
        .list_pending_keys()
        .unwrap()
        .into_iter()
        .map(|k| k.id)
        .collect();

    let harness = TestHarness::builder()
        .upstream(Arc::new(StoreKeySource::new(upstream)))
        .build();

    let first: Value = admin_post(&harness, "/v1/admin/sync-keys").await.json();
    assert_eq!(first["success"], true);
    assert_eq!(first["count"], 2);
    assert_eq!(first["message"], "Synced 2 of 2 upstream keys");

    let second: Value = admin_post(&harness, "/v1/admin/sync-keys").await.json();
    assert_eq!(second["count"], 0);
    assert_eq!(second["message"], "All 2 upstream keys already present");

    let local = harness.store.list_pending_keys().unwrap();
    assert_eq!(local.len(), 2);
    assert!(local.iter().all(|k| !upstream_ids.contains(&k.id)));
}

#[tokio::test]
async fn sync_with_empty_upstream_says_so() {
    let (_dir, upstream) = upstream_store();
    let harness = TestHarness::builder()
        .upstream(Arc::new(StoreKeySource::new(upstream)))
        .build();

    let body: Value = admin_post(&harness, "/v1/admin/sync-keys").await.json();

    assert_eq!(body["count"], 0);
    assert_eq!(body["message"], "No pending keys found upstream");
}

#[tokio::test]
async fn sync_over_http_uses_the_export_endpoint() {
    let remote = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/admin/keys/pending"))
        .and(header("x-admin-key", "upstream-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keys": [
                { "code": "REMOTE-1", "script_code": "print(1)", "maps": ["desert"] },
                { "code": "", "script_code": "ignored" },
            ]
        })))
        .expect(1)
        .mount(&remote)
        .await;

    let source = HttpKeySource::new(
        remote.uri(),
        "upstream-key",
        std::time::Duration::from_secs(1),
    )
    .unwrap();
    let harness = TestHarness::builder().upstream(Arc::new(source)).build();

    let body: Value = admin_post(&harness, "/v1/admin/sync-keys").await.json();

    assert_eq!(body["count"], 1);
    let key = harness.store.get_key_by_code("REMOTE-1").unwrap().unwrap();
    assert_eq!(key.status, KeyStatus::Pending);
    assert!(key.maps.contains("desert"));
}

#[tokio::test]
async fn sync_surfaces_upstream_failure() {
    let remote = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&remote)
        .await;

    let source =
        HttpKeySource::new(remote.uri(), "k", std::time::Duration::from_secs(1)).unwrap();
    let harness = TestHarness::builder().upstream(Arc::new(source)).build();

    let response = admin_post(&harness, "/v1/admin/sync-keys").await;

    response.assert_status_internal_server_error();
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "internal_error");
    assert!(body["message"].is_string());
    assert_eq!(body["message"], body["error"]);
}

#[tokio::test]
async fn sync_without_upstream_is_rejected() {
    let harness = TestHarness::new();

    admin_post(&harness, "/v1/admin/sync-keys")
        .await
        .assert_status_bad_request();
}

// ============================================================================
// Operator reset
// ============================================================================

#[tokio::test]
async fn operator_reset_clears_every_binding() {
    let harness = TestHarness::new();
    let owner = UserId::generate();
    let first = bound_key(&harness, "KEY-A", &owner);
    let second = bound_key(&harness, "KEY-B", &owner);

    let response = admin_post(&harness, "/v1/admin/reset-hwid")
        .json(&json!({ "user_id": owner.to_string() }))
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["count"], 2);
    for key in [first, second] {
        let stored = harness.store.get_key(&key.id).unwrap().unwrap();
        assert!(stored.hardware_id.is_none());
        assert_eq!(stored.status, KeyStatus::Active);
    }
}

#[tokio::test]
async fn operator_reset_for_user_without_keys_is_not_found() {
    let harness = TestHarness::new();

    let response = admin_post(&harness, "/v1/admin/reset-hwid")
        .json(&json!({ "user_id": UserId::generate().to_string() }))
        .await;

    response.assert_status_not_found();
    assert_eq!(response.json::<Value>()["code"], "key_not_found");
}

#[tokio::test]
async fn operator_reset_validates_user_id() {
    let harness = TestHarness::new();

    admin_post(&harness, "/v1/admin/reset-hwid")
        .json(&json!({ "user_id": "nobody" }))
        .await
        .assert_status_bad_request();
}
