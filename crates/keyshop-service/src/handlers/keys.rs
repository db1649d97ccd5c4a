//! Key lifecycle handlers: verify, purchase, execute, reset and list.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use keyshop_core::{format_amount, is_valid_hwid, to_major_units, Key, KeyId, KeyStatus};
use keyshop_store::StoreError;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Response carrying a released script.
#[derive(Debug, Serialize)]
pub struct ScriptResponse {
    /// Always `true`.
    pub success: bool,
    /// The key's script payload.
    pub script_code: String,
}

/// Simple success response.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Always `true`.
    pub success: bool,
    /// Human message.
    pub message: String,
}

// ============================================================================
// Verify
// ============================================================================

/// Verify request.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    /// License code.
    #[serde(default)]
    pub code: String,
}

/// Activate a purchased key and release its script.
pub async fn verify_key(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<ScriptResponse>, ApiError> {
    let code = required(&body.code, "code")?;

    let key = state
        .store
        .activate_key(code, &auth.user_id)
        .map_err(|e| match e {
            StoreError::NotFound => ApiError::VerifyFailed,
            other => other.into(),
        })?;

    tracing::info!(user_id = %auth.user_id, key_id = %key.id, "Key activated");

    Ok(Json(ScriptResponse {
        success: true,
        script_code: key.script_code,
    }))
}

// ============================================================================
// Purchase
// ============================================================================

/// Purchase request.
#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    /// Map to buy a key for.
    #[serde(default)]
    pub map: String,
}

/// Purchase response.
#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    /// Always `true`.
    pub success: bool,
    /// Human message.
    pub message: String,
    /// The claimed key.
    pub key_id: String,
    /// Remaining balance in major units.
    pub balance: f64,
    /// Remaining balance in minor units.
    pub balance_cents: i64,
}

/// Buy the oldest matching key for a map.
pub async fn purchase_key(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<PurchaseRequest>,
) -> Result<Json<PurchaseResponse>, ApiError> {
    let map_name = body.map.trim();
    if !state.config.pricing.is_purchasable(map_name) {
        return Err(ApiError::Validation(format!(
            "unknown or empty map name: {map_name:?}"
        )));
    }

    let price = state.config.pricing.key_price_cents;
    let claim = state
        .store
        .claim_key(map_name, &auth.user_id, price)
        .map_err(|e| {
            tracing::info!(user_id = %auth.user_id, map = %map_name, error = %e, "Purchase refused");
            ApiError::from(e)
        })?;

    tracing::info!(
        user_id = %auth.user_id,
        key_id = %claim.key.id,
        map = %map_name,
        price_cents = price,
        balance_cents = claim.balance_cents,
        "Key purchased"
    );

    Ok(Json(PurchaseResponse {
        success: true,
        message: format!(
            "Purchased a key for {map_name} at {}. Verify it to receive the script.",
            format_amount(price)
        ),
        key_id: claim.key.id.to_string(),
        balance: to_major_units(claim.balance_cents),
        balance_cents: claim.balance_cents,
    }))
}

// ============================================================================
// Execute
// ============================================================================

/// Loader execution request.
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    /// License code.
    #[serde(default)]
    pub code: String,
    /// Hardware id of the executing machine.
    #[serde(default)]
    pub hwid: String,
}

/// Release the script of an active key to a machine, binding its hardware id on the
/// first call.
pub async fn execute_key(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExecuteRequest>,
) -> Result<Json<ScriptResponse>, ApiError> {
    let code = required(&body.code, "code")?;
    if !is_valid_hwid(&body.hwid) {
        return Err(ApiError::Validation(
            "hwid must be 1-128 printable characters".into(),
        ));
    }

    let (key, bound) = state
        .store
        .bind_hwid(code, &body.hwid)
        .map_err(|e| match e {
            StoreError::NotFound => ApiError::VerifyFailed,
            StoreError::HwidMismatch => {
                tracing::warn!("Key executed from a different machine");
                ApiError::HwidMismatch
            }
            other => other.into(),
        })?;

    if bound {
        tracing::info!(key_id = %key.id, "Hardware id bound");
    }

    Ok(Json(ScriptResponse {
        success: true,
        script_code: key.script_code,
    }))
}

// ============================================================================
// Reset HWID
// ============================================================================

/// Reset request.
#[derive(Debug, Deserialize)]
pub struct ResetHwidRequest {
    /// Key to reset.
    #[serde(default)]
    pub key_id: String,
}

/// Clear the hardware binding of one of the caller's keys.
pub async fn reset_hwid(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<ResetHwidRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let key_id: KeyId = required(&body.key_id, "key_id")?
        .parse()
        .map_err(|_| ApiError::Validation("key_id is not a valid key identifier".into()))?;

    let outcome = state
        .store
        .reset_hwid(&key_id, &auth.user_id, state.has_notifier())?;

    tracing::info!(user_id = %auth.user_id, key_id = %key_id, "Hardware id reset");
    state.dispatch(outcome.notifications);

    Ok(Json(MessageResponse {
        success: true,
        message: "Hardware id reset".to_string(),
    }))
}

// ============================================================================
// List
// ============================================================================

/// A key as shown to its owner.
#[derive(Debug, Serialize)]
pub struct KeyResponse {
    /// Key ID.
    pub id: String,
    /// License code.
    pub code: String,
    /// Lifecycle status.
    pub status: KeyStatus,
    /// Unlocked maps.
    pub maps: Vec<String>,
    /// Whether a hardware id is bound.
    pub hwid_bound: bool,
    /// Script payload, only once the key is active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_code: Option<String>,
    /// Timestamp.
    pub created_at: String,
}

impl From<Key> for KeyResponse {
    fn from(key: Key) -> Self {
        let script_code = (key.status == KeyStatus::Active).then_some(key.script_code);
        Self {
            id: key.id.to_string(),
            code: key.code,
            status: key.status,
            maps: key.maps.into_iter().collect(),
            hwid_bound: key.hardware_id.is_some(),
            script_code,
            created_at: key.created_at.to_rfc3339(),
        }
    }
}

/// Key list response.
#[derive(Debug, Serialize)]
pub struct ListKeysResponse {
    /// The caller's keys, oldest first.
    pub keys: Vec<KeyResponse>,
}

/// List the caller's keys.
pub async fn list_keys(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ListKeysResponse>, ApiError> {
    let keys = state
        .store
        .list_keys_by_owner(&auth.user_id)?
        .into_iter()
        .map(KeyResponse::from)
        .collect();

    Ok(Json(ListKeysResponse { keys }))
}

/// Trim a required field, rejecting blanks.
pub(crate) fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::Validation(format!("{field} is required")));
    }
    Ok(value)
}
