//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, balance, health, keys, topup};
use crate::state::AppState;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `POST /v1/keys/execute` - Loader call, binds the hardware id
///
/// ## User (bearer JWT)
/// - `POST /v1/keys/verify` - Activate a purchased key
/// - `POST /v1/keys/purchase` - Buy a key for a map
/// - `POST /v1/keys/reset-hwid` - Clear a key's hardware binding
/// - `GET /v1/keys` - List own keys
/// - `GET /v1/balance` - Current balance
/// - `GET /v1/transactions` - Transaction history
/// - `POST /v1/topup/truemoney` - Redeem a TrueMoney voucher
///
/// ## Operator (admin JWT or `x-admin-key`)
/// - `POST /v1/admin/sync-keys` - Pull unclaimed keys from upstream
/// - `POST /v1/admin/reset-hwid` - Reset every key of a user
/// - `POST /v1/admin/keys` - Provision keys
/// - `GET /v1/admin/keys/pending` - Export unclaimed keys
/// - `POST /v1/admin/outbox/replay` - Re-deliver undelivered notifications
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let state = Arc::new(state);

    let key_routes = Router::new()
        .route("/", get(keys::list_keys))
        .route("/verify", post(keys::verify_key))
        .route("/purchase", post(keys::purchase_key))
        .route("/reset-hwid", post(keys::reset_hwid))
        .route("/execute", post(keys::execute_key));

    let admin_routes = Router::new()
        .route("/sync-keys", post(admin::sync_keys))
        .route("/reset-hwid", post(admin::reset_hwid_for_user))
        .route("/keys", post(admin::provision_keys))
        .route("/keys/pending", get(admin::export_pending_keys))
        .route("/outbox/replay", post(admin::replay_outbox));

    let api_routes = Router::new()
        .nest("/keys", key_routes)
        .route("/balance", get(balance::get_balance))
        .route("/transactions", get(balance::list_transactions))
        .route("/topup/truemoney", post(topup::redeem_truemoney))
        .nest("/admin", admin_routes);

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
