//! Notification outbox integration tests.

mod common;

use std::time::Duration;

use common::{TestHarness, VOUCHER};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use keyshop_core::{DeliveryStatus, Key, KeyId, Notification};
use keyshop_service::crypto::{sign_payload, SIGNATURE_HEADER};
use keyshop_store::Store;

const HOOK: &str = "/hook";

async fn sink(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(HOOK))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

/// Poll until `check` holds, failing the test after a few seconds.
async fn eventually<F: FnMut() -> bool>(mut check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

/// Sell, activate and bind a key for the harness user.
fn owned_key(harness: &TestHarness) -> Key {
    harness.stock("KEY-0001", &[]);
    harness.fund(&harness.test_user_id, 10_000);
    let claim = harness
        .store
        .claim_key("forest", &harness.test_user_id, 10_000)
        .unwrap();
    harness
        .store
        .activate_key(&claim.key.code, &harness.test_user_id)
        .unwrap();
    harness
        .store
        .bind_hwid(&claim.key.code, "HWID-1")
        .unwrap();
    claim.key
}

async fn reset(harness: &TestHarness, key_id: KeyId) {
    harness
        .server
        .post("/v1/keys/reset-hwid")
        .add_header(TestHarness::authorization(), harness.user_auth())
        .json(&json!({ "key_id": key_id.to_string() }))
        .await
        .assert_status_ok();
}

fn undelivered(harness: &TestHarness) -> Vec<Notification> {
    harness.store.list_undelivered_notifications().unwrap()
}

async fn sink_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn reset_is_announced_to_the_sink() {
    let server = sink(200).await;
    let harness = TestHarness::builder()
        .notifier(format!("{}{HOOK}", server.uri()), 3)
        .build();
    let key = owned_key(&harness);

    reset(&harness, key.id).await;

    let mut bodies = Vec::new();
    for _ in 0..200 {
        bodies = sink_bodies(&server).await;
        if !bodies.is_empty() && undelivered(&harness).is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["event"], "hwid_reset");
    assert_eq!(bodies[0]["key_id"], key.id.to_string());
    assert_eq!(bodies[0]["user_id"], harness.test_user_id.to_string());
    assert!(bodies[0]["content"]
        .as_str()
        .unwrap()
        .contains("reset HWID"));
    assert!(undelivered(&harness).is_empty());
}

#[tokio::test]
async fn no_rows_without_a_sink() {
    let harness = TestHarness::new();
    let key = owned_key(&harness);

    reset(&harness, key.id).await;

    assert!(undelivered(&harness).is_empty());
}

#[tokio::test]
async fn failing_sink_dead_letters_after_max_attempts() {
    let server = sink(500).await;
    let harness = TestHarness::builder()
        .notifier(format!("{}{HOOK}", server.uri()), 3)
        .build();
    let key = owned_key(&harness);

    reset(&harness, key.id).await;

    eventually(|| {
        undelivered(&harness)
            .iter()
            .any(|n| n.status == DeliveryStatus::DeadLettered)
    })
    .await;

    let rows = undelivered(&harness);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].attempts, 3);
    assert!(rows[0].last_error.as_deref().unwrap().contains("500"));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn replay_delivers_dead_lettered_rows() {
    let server = MockServer::start().await;
    // First two attempts fail, everything after succeeds.
    Mock::given(method("POST"))
        .and(path(HOOK))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(HOOK))
        .respond_with(ResponseTemplate::new(200))
        .with_priority(2)
        .mount(&server)
        .await;

    let harness = TestHarness::builder()
        .notifier(format!("{}{HOOK}", server.uri()), 2)
        .build();
    let key = owned_key(&harness);

    reset(&harness, key.id).await;
    eventually(|| {
        undelivered(&harness)
            .iter()
            .any(|n| n.status == DeliveryStatus::DeadLettered)
    })
    .await;

    let (name, value) = TestHarness::admin_key();
    let response = harness
        .server
        .post("/v1/admin/outbox/replay")
        .add_header(name, value)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["delivered"], 1);
    assert_eq!(body["failed"], 0);
    assert_eq!(body["in_flight"], 0);
    assert!(undelivered(&harness).is_empty());
}

#[tokio::test]
async fn replay_skips_a_row_already_being_delivered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(HOOK))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;

    let harness = TestHarness::builder()
        .notifier(format!("{}{HOOK}", server.uri()), 3)
        .build();
    let key = owned_key(&harness);

    // The spawned delivery is still waiting on the slow sink when the replay starts.
    reset(&harness, key.id).await;
    let pending = undelivered(&harness);
    assert_eq!(pending.len(), 1);
    let id = pending[0].id;

    let (name, value) = TestHarness::admin_key();
    let response = harness
        .server
        .post("/v1/admin/outbox/replay")
        .add_header(name, value)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["failed"], 0);
    assert_eq!(
        body["delivered"].as_u64().unwrap() + body["in_flight"].as_u64().unwrap(),
        1
    );

    eventually(|| undelivered(&harness).is_empty()).await;
    // Leave room for a duplicate send to land before counting.
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    let row = harness.store.get_notification(&id).unwrap().unwrap();
    assert_eq!(row.status, DeliveryStatus::Delivered);
    assert_eq!(row.attempts, 1);
    assert!(!row.is_leased());
}

#[tokio::test]
async fn replay_without_sink_is_rejected() {
    let harness = TestHarness::new();
    let (name, value) = TestHarness::admin_key();

    harness
        .server
        .post("/v1/admin/outbox/replay")
        .add_header(name, value)
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn signed_topup_notification() {
    let hook = sink(200).await;
    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/campaign/vouchers/{VOUCHER}/redeem")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": { "code": "SUCCESS", "message": "success" },
            "data": { "my_ticket": { "amount_baht": "75.25" } }
        })))
        .mount(&gateway)
        .await;

    let harness = TestHarness::builder()
        .gateway(gateway.uri())
        .notifier(format!("{}{HOOK}", hook.uri()), 3)
        .config(|c| c.notify_webhook_secret = Some("sink-secret".into()))
        .build();

    harness
        .server
        .post("/v1/topup/truemoney")
        .add_header(TestHarness::authorization(), harness.user_auth())
        .json(&json!({ "voucher_code": VOUCHER }))
        .await
        .assert_status_ok();

    let mut requests = Vec::new();
    for _ in 0..200 {
        requests = hook.received_requests().await.unwrap_or_default();
        if !requests.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(requests.len(), 1);

    let request = &requests[0];
    let body: Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["event"], "topup_success");
    assert_eq!(body["amount_cents"], 7_525);
    assert_eq!(body["voucher_code"], VOUCHER);

    let signature = request
        .headers
        .get(SIGNATURE_HEADER)
        .expect("signature header")
        .to_str()
        .unwrap();
    let timestamp: i64 = signature
        .split(',')
        .find_map(|part| part.strip_prefix("t="))
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(
        signature,
        sign_payload("sink-secret", timestamp, &request.body)
    );
}
