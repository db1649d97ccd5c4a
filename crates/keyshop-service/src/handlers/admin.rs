//! Operator handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use keyshop_core::{Key, UserId};

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::handlers::keys::required;
use crate::state::AppState;
use crate::sync::{self, ExportedKey, ExportedKeys};

/// Response for operations that report a count.
#[derive(Debug, Serialize)]
pub struct CountResponse {
    /// Always `true`.
    pub success: bool,
    /// Human message.
    pub message: String,
    /// Affected records.
    pub count: usize,
}

/// Pull unclaimed keys from the upstream deployment.
pub async fn sync_keys(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
) -> Result<Json<CountResponse>, ApiError> {
    let upstream = state
        .upstream
        .as_ref()
        .ok_or_else(|| ApiError::Validation("upstream key source not configured".into()))?;

    tracing::info!(admin_id = %admin.admin_id, "Key sync requested");

    let outcome = sync::sync_keys(state.store.as_ref(), upstream.as_ref())
        .await
        .map_err(|e| ApiError::Internal(format!("key sync failed: {e}")))?;

    Ok(Json(CountResponse {
        success: true,
        message: outcome.message(),
        count: outcome.inserted,
    }))
}

/// Operator reset request.
#[derive(Debug, Deserialize)]
pub struct AdminResetRequest {
    /// User whose keys are reset.
    #[serde(default)]
    pub user_id: String,
}

/// Clear the hardware binding of every key a user owns.
pub async fn reset_hwid_for_user(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<AdminResetRequest>,
) -> Result<Json<CountResponse>, ApiError> {
    let user_id: UserId = required(&body.user_id, "user_id")?
        .parse()
        .map_err(|_| ApiError::Validation("user_id is not a valid user identifier".into()))?;

    let outcome = state
        .store
        .reset_hwids_for_owner(&user_id, state.has_notifier())?;
    let count = outcome.keys.len();

    tracing::info!(
        admin_id = %admin.admin_id,
        user_id = %user_id,
        count,
        "Hardware ids reset by operator"
    );
    state.dispatch(outcome.notifications);

    Ok(Json(CountResponse {
        success: true,
        message: format!("Reset {count} keys"),
        count,
    }))
}

/// Provisioning request.
#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    /// Keys to stock.
    #[serde(default)]
    pub keys: Vec<ExportedKey>,
}

/// Provisioning response.
#[derive(Debug, Serialize)]
pub struct ProvisionResponse {
    /// Always `true`.
    pub success: bool,
    /// Keys inserted.
    pub inserted: usize,
    /// Keys skipped because their code already exists.
    pub skipped: usize,
}

/// Stock new unclaimed keys.
pub async fn provision_keys(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<ProvisionRequest>,
) -> Result<Json<ProvisionResponse>, ApiError> {
    if body.keys.is_empty() {
        return Err(ApiError::Validation("keys must not be empty".into()));
    }
    if body.keys.iter().any(|k| k.code.trim().is_empty()) {
        return Err(ApiError::Validation("every key needs a code".into()));
    }

    let total = body.keys.len();
    let mut inserted = 0;
    for entry in body.keys {
        let key = Key::pending(entry.code.trim(), entry.script_code, entry.maps);
        if state.store.insert_key(&key)? {
            inserted += 1;
        }
    }
    let skipped = total - inserted;

    tracing::info!(admin_id = %admin.admin_id, inserted, skipped, "Keys provisioned");

    Ok(Json(ProvisionResponse {
        success: true,
        inserted,
        skipped,
    }))
}

/// Export unclaimed keys without a hardware binding, for another deployment to sync.
pub async fn export_pending_keys(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> Result<Json<ExportedKeys>, ApiError> {
    let keys = state
        .store
        .list_pending_keys()?
        .iter()
        .filter(|k| k.is_syncable())
        .map(ExportedKey::from)
        .collect();

    Ok(Json(ExportedKeys { keys }))
}

/// Outbox replay response.
#[derive(Debug, Serialize)]
pub struct ReplayResponse {
    /// Always `true`.
    pub success: bool,
    /// Rows delivered.
    pub delivered: usize,
    /// Rows still undelivered.
    pub failed: usize,
    /// Rows skipped because a delivery is already running.
    pub in_flight: usize,
}

/// Re-deliver every pending or dead-lettered notification not already in flight.
pub async fn replay_outbox(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
) -> Result<Json<ReplayResponse>, ApiError> {
    let notifier = state
        .notifier
        .as_ref()
        .ok_or_else(|| ApiError::Validation("notification webhook not configured".into()))?;

    tracing::info!(admin_id = %admin.admin_id, "Outbox replay requested");

    let summary = notifier
        .replay(state.store.as_ref())
        .await
        .map_err(|e| ApiError::Internal(format!("outbox replay failed: {e}")))?;

    Ok(Json(ReplayResponse {
        success: true,
        delivered: summary.delivered,
        failed: summary.failed,
        in_flight: summary.in_flight,
    }))
}
