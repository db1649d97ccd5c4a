//! Keyshop Service - HTTP API for the key storefront
//!
//! This is the main entry point for the keyshop service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keyshop_service::{create_router, AppState, ServiceConfig};
use keyshop_store::{RocksStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,keyshop=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Keyshop Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        auth_configured = %config.auth_jwt_secret.is_some(),
        truemoney_configured = %config.truemoney_api_url.is_some(),
        notify_configured = %config.notify_webhook_url.is_some(),
        upstream_configured = %config.upstream_url.is_some(),
        key_price_cents = config.pricing.key_price_cents,
        "Service configuration loaded"
    );

    // Initialize RocksDB store
    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    let store: Arc<dyn Store> = Arc::new(RocksStore::open(&config.data_dir)?);

    // Build app state
    let state = AppState::new(store, config.clone());

    // Deliver whatever the previous run left in the outbox
    if let Some(notifier) = state.notifier.clone() {
        let store = Arc::clone(&state.store);
        tokio::spawn(async move {
            match notifier.replay(store.as_ref()).await {
                Ok(summary) => tracing::info!(
                    delivered = summary.delivered,
                    failed = summary.failed,
                    in_flight = summary.in_flight,
                    "Startup outbox replay finished"
                ),
                Err(e) => tracing::error!(error = %e, "Startup outbox replay failed"),
            }
        });
    }

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
