//! Append-only audit log rows.
//!
//! Every terminal outcome of a voucher redemption is recorded here, success or not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{LogId, UserId};

/// An audit log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    /// Row identifier.
    pub id: LogId,

    /// The user the event concerns.
    pub user_id: UserId,

    /// What happened.
    pub action: AuditAction,

    /// Structured event payload.
    pub details: serde_json::Value,

    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

impl AuditLog {
    /// Create a new audit row.
    #[must_use]
    pub fn new(user_id: UserId, action: AuditAction, details: serde_json::Value) -> Self {
        Self {
            id: LogId::generate(),
            user_id,
            action,
            details,
            created_at: Utc::now(),
        }
    }
}

/// Enumerated audit event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Voucher redeemed and balance credited.
    TopupSuccess,
    /// Voucher code failed format validation.
    TopupInvalidFormat,
    /// Gateway timed out, was unreachable, or is not configured.
    TopupGatewayUnavailable,
    /// Gateway reports the voucher as already redeemed.
    TopupAlreadyRedeemed,
    /// Gateway reports the voucher as invalid or expired.
    TopupInvalidVoucher,
    /// Gateway rejected the redemption for another reason.
    TopupFailed,
    /// Gateway returned a non-positive or unparseable amount.
    TopupInvalidAmount,
    /// The atomic credit could not be committed.
    TopupTransactionFailed,
}

impl AuditAction {
    /// The stored event name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TopupSuccess => "topup_success",
            Self::TopupInvalidFormat => "topup_invalid_format",
            Self::TopupGatewayUnavailable => "topup_gateway_unavailable",
            Self::TopupAlreadyRedeemed => "topup_already_redeemed",
            Self::TopupInvalidVoucher => "topup_invalid_voucher",
            Self::TopupFailed => "topup_failed",
            Self::TopupInvalidAmount => "topup_invalid_amount",
            Self::TopupTransactionFailed => "topup_transaction_failed",
        }
    }
}
