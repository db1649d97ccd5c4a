//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use keyshop_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or invalid credentials.
    #[error("authentication required")]
    Unauthenticated,

    /// Valid credentials but insufficient permissions.
    #[error("forbidden")]
    Forbidden,

    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),

    /// Voucher code does not match the expected format.
    #[error("invalid voucher code format")]
    InvalidFormat,

    /// Key cannot be verified or executed. Covers unknown code, wrong owner and wrong
    /// status alike.
    #[error("Verify Failed")]
    VerifyFailed,

    /// No such key owned by the caller.
    #[error("key not found")]
    KeyNotFound,

    /// The key is bound to another hardware id.
    #[error("key is bound to another device")]
    HwidMismatch,

    /// Balance below the key price.
    #[error("insufficient balance: balance={balance}, required={required}")]
    InsufficientBalance {
        /// Current balance in minor units.
        balance: i64,
        /// Required amount in minor units.
        required: i64,
    },

    /// No unclaimed key for the requested map.
    #[error("no keys available for map {0}")]
    NoStock(String),

    /// Payment gateway timed out, was unreachable or is not configured.
    #[error("payment gateway unavailable, try again later")]
    GatewayUnavailable,

    /// Voucher was already redeemed.
    #[error("voucher already redeemed")]
    AlreadyRedeemed,

    /// Voucher is invalid, expired or unknown.
    #[error("voucher is invalid or expired")]
    InvalidVoucher,

    /// Gateway rejected the redemption for another reason.
    #[error("voucher redemption failed: {0}")]
    RedeemFailed(String),

    /// Gateway returned an unusable amount.
    #[error("voucher amount is invalid")]
    InvalidAmount,

    /// The credit could not be committed.
    #[error("could not record the top-up, try again later")]
    TransactionFailed,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::KeyNotFound => StatusCode::NOT_FOUND,
            Self::HwidMismatch => StatusCode::CONFLICT,
            Self::TransactionFailed | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Validation(_)
            | Self::InvalidFormat
            | Self::VerifyFailed
            | Self::InsufficientBalance { .. }
            | Self::NoStock(_)
            | Self::GatewayUnavailable
            | Self::AlreadyRedeemed
            | Self::InvalidVoucher
            | Self::RedeemFailed(_)
            | Self::InvalidAmount => StatusCode::BAD_REQUEST,
        }
    }

    /// Machine-readable reason.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::Validation(_) => "validation",
            Self::InvalidFormat => "invalid_format",
            Self::VerifyFailed => "verify_failed",
            Self::KeyNotFound => "key_not_found",
            Self::HwidMismatch => "hwid_mismatch",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::NoStock(_) => "no_stock",
            Self::GatewayUnavailable => "gateway_unavailable",
            Self::AlreadyRedeemed => "already_redeemed",
            Self::InvalidVoucher => "invalid_voucher",
            Self::RedeemFailed(_) => "redeem_failed",
            Self::InvalidAmount => "invalid_amount",
            Self::TransactionFailed => "transaction_failed",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether the client may retry the same request later.
    #[must_use]
    pub const fn retryable(&self) -> bool {
        matches!(self, Self::GatewayUnavailable | Self::TransactionFailed)
    }
}

/// JSON error response body.
///
/// `message` repeats `error` for clients that read the success-shaped field.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    code: &'static str,
    message: String,
    error: String,
    retryable: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = match &self {
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            success: false,
            code: self.code(),
            message: error.clone(),
            error,
            retryable: self.retryable(),
        };

        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::KeyNotFound,
            StoreError::InsufficientBalance { balance, required } => {
                Self::InsufficientBalance { balance, required }
            }
            StoreError::NoStock { map } => Self::NoStock(map),
            StoreError::HwidMismatch => Self::HwidMismatch,
            StoreError::Database(msg)
            | StoreError::Serialization(msg)
            | StoreError::Domain(msg) => Self::Internal(msg),
        }
    }
}
