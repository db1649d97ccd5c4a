//! Voucher top-up handler.
//!
//! Every terminal outcome of a redemption leaves an audit row. The success row is
//! written by the store together with the credit; failure rows are written here.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use keyshop_core::{format_amount, to_major_units, AuditAction, AuditLog, UserId, VoucherCode};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;
use crate::truemoney::GatewayError;

/// Top-up request.
#[derive(Debug, Deserialize)]
pub struct TopupRequest {
    /// TrueMoney voucher code.
    #[serde(default)]
    pub voucher_code: String,
    /// User to credit; must be the caller when present.
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Top-up response.
#[derive(Debug, Serialize)]
pub struct TopupResponse {
    /// Always `true`.
    pub success: bool,
    /// Credited amount in major units.
    pub amount: f64,
    /// Credited amount in minor units.
    pub amount_cents: i64,
    /// Human message.
    pub message: String,
    /// New balance in major units.
    pub balance: f64,
    /// New balance in minor units.
    pub balance_cents: i64,
}

/// Redeem a TrueMoney voucher and credit the caller's balance.
pub async fn redeem_truemoney(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<TopupRequest>,
) -> Result<Json<TopupResponse>, ApiError> {
    let user_id = auth.user_id;

    if let Some(requested) = body.user_id.as_deref() {
        let requested: UserId = requested
            .parse()
            .map_err(|_| ApiError::Validation("user_id is not a valid user identifier".into()))?;
        if requested != user_id {
            tracing::warn!(user_id = %user_id, requested = %requested, "Top-up for another user refused");
            return Err(ApiError::Forbidden);
        }
    }

    let raw_code = body.voucher_code.trim();
    let Ok(voucher) = VoucherCode::parse(raw_code) else {
        record(
            &state,
            user_id,
            AuditAction::TopupInvalidFormat,
            json!({ "voucher_code": raw_code }),
        );
        return Err(ApiError::InvalidFormat);
    };

    let Some(gateway) = state.gateway.as_ref() else {
        record(
            &state,
            user_id,
            AuditAction::TopupGatewayUnavailable,
            json!({ "voucher_code": voucher.as_str(), "error": "gateway not configured" }),
        );
        return Err(ApiError::GatewayUnavailable);
    };

    let redemption = match gateway.redeem(&voucher).await {
        Ok(redemption) => redemption,
        Err(e) => {
            let (action, err) = classify(&e);
            tracing::warn!(user_id = %user_id, voucher_code = %voucher, error = %e, "Voucher redemption failed");
            record(
                &state,
                user_id,
                action,
                json!({
                    "voucher_code": voucher.as_str(),
                    "code": e.code(),
                    "error": e.to_string(),
                }),
            );
            return Err(err);
        }
    };

    let topup = match state.store.credit_topup(
        &user_id,
        redemption.amount_cents,
        &voucher,
        state.has_notifier(),
    ) {
        Ok(topup) => topup,
        Err(e) => {
            // The gateway has already taken the voucher; the row is what support
            // reconciles against.
            tracing::error!(
                user_id = %user_id,
                voucher_code = %voucher,
                amount_cents = redemption.amount_cents,
                error = %e,
                "Top-up credit failed after redemption"
            );
            record(
                &state,
                user_id,
                AuditAction::TopupTransactionFailed,
                json!({
                    "voucher_code": voucher.as_str(),
                    "amount_cents": redemption.amount_cents,
                    "error": e.to_string(),
                }),
            );
            return Err(ApiError::TransactionFailed);
        }
    };

    tracing::info!(
        user_id = %user_id,
        voucher_code = %voucher,
        amount_cents = redemption.amount_cents,
        balance_cents = topup.balance_cents,
        "Voucher redeemed"
    );
    state.dispatch(topup.notification);

    Ok(Json(TopupResponse {
        success: true,
        amount: to_major_units(redemption.amount_cents),
        amount_cents: redemption.amount_cents,
        message: format!("Credited {}", format_amount(redemption.amount_cents)),
        balance: to_major_units(topup.balance_cents),
        balance_cents: topup.balance_cents,
    }))
}

/// Map a gateway failure onto its audit action and API error.
fn classify(err: &GatewayError) -> (AuditAction, ApiError) {
    match err {
        GatewayError::Unavailable(_) | GatewayError::Configuration(_) => (
            AuditAction::TopupGatewayUnavailable,
            ApiError::GatewayUnavailable,
        ),
        GatewayError::AlreadyRedeemed { .. } => {
            (AuditAction::TopupAlreadyRedeemed, ApiError::AlreadyRedeemed)
        }
        GatewayError::InvalidVoucher { .. } => {
            (AuditAction::TopupInvalidVoucher, ApiError::InvalidVoucher)
        }
        GatewayError::Rejected { message, .. } => {
            (AuditAction::TopupFailed, ApiError::RedeemFailed(message.clone()))
        }
        GatewayError::InvalidAmount(_) => (AuditAction::TopupInvalidAmount, ApiError::InvalidAmount),
    }
}

/// Append a failure audit row. A failed write is logged and otherwise ignored.
fn record(state: &AppState, user_id: UserId, action: AuditAction, details: serde_json::Value) {
    let log = AuditLog::new(user_id, action, details);
    if let Err(e) = state.store.put_audit_log(&log) {
        tracing::error!(
            user_id = %user_id,
            action = action.as_str(),
            error = %e,
            "Failed to write audit row"
        );
    }
}
