//! Cross-origin preflight integration tests.

mod common;

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_HEADERS,
    ACCESS_CONTROL_REQUEST_METHOD, ORIGIN,
};
use axum::http::{HeaderValue, Method};
use common::TestHarness;

use keyshop_core::KeyStatus;
use keyshop_store::Store;

const SHOP: &str = "https://shop.example";

async fn preflight(harness: &TestHarness, origin: &'static str) -> axum_test::TestResponse {
    harness
        .server
        .method(Method::OPTIONS, "/v1/keys/purchase")
        .add_header(ORIGIN, HeaderValue::from_static(origin))
        .add_header(ACCESS_CONTROL_REQUEST_METHOD, HeaderValue::from_static("POST"))
        .add_header(
            ACCESS_CONTROL_REQUEST_HEADERS,
            HeaderValue::from_static("authorization,content-type"),
        )
        .await
}

#[tokio::test]
async fn preflight_is_answered_without_reaching_the_handler() {
    let harness = TestHarness::new();
    let key = harness.stock("KEY-0001", &[]);
    harness.fund(&harness.test_user_id, 15_000);

    let response = preflight(&harness, SHOP).await;

    assert!(response.status_code().is_success());
    let headers = response.headers();
    assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    assert!(headers.contains_key(ACCESS_CONTROL_ALLOW_METHODS));

    // No purchase happened: the key is still in stock and the balance untouched.
    let stored = harness.store.get_key(&key.id).unwrap().unwrap();
    assert_eq!(stored.status, KeyStatus::Pending);
    assert!(stored.owner_id.is_none());
    let balance = harness
        .store
        .get_balance(&harness.test_user_id)
        .unwrap()
        .unwrap();
    assert_eq!(balance.balance_cents, 15_000);
}

#[tokio::test]
async fn restricted_origins_are_echoed_only_when_listed() {
    let harness = TestHarness::builder()
        .config(|c| c.cors_origins = vec![SHOP.into()])
        .build();

    let allowed = preflight(&harness, SHOP).await;
    assert!(allowed.status_code().is_success());
    assert_eq!(
        allowed.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        SHOP
    );

    let denied = preflight(&harness, "https://elsewhere.example").await;
    assert!(denied
        .headers()
        .get(ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
