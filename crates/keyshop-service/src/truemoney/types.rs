//! TrueMoney voucher API types.

use serde::{Deserialize, Serialize};

/// Redemption request body.
#[derive(Debug, Clone, Serialize)]
pub struct RedeemRequest<'a> {
    /// Receiving wallet mobile number.
    pub mobile: &'a str,
    /// The voucher code being redeemed.
    pub voucher_hash: &'a str,
}

/// Redemption response envelope.
///
/// The gateway answers with this shape on success and on most failures, often with a
/// non-2xx HTTP status.
#[derive(Debug, Clone, Deserialize)]
pub struct RedeemResponse {
    /// Outcome status.
    pub status: RedeemStatus,
    /// Payload, present on success.
    #[serde(default)]
    pub data: Option<RedeemData>,
}

/// Outcome status of a redemption.
#[derive(Debug, Clone, Deserialize)]
pub struct RedeemStatus {
    /// Machine code, `SUCCESS` on success.
    pub code: String,
    /// Human message.
    #[serde(default)]
    pub message: String,
}

/// Successful redemption payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RedeemData {
    /// The ticket credited to the receiving wallet.
    #[serde(default)]
    pub my_ticket: Option<Ticket>,
}

/// A redeemed ticket.
#[derive(Debug, Clone, Deserialize)]
pub struct Ticket {
    /// Credited amount as a decimal string, e.g. `"50.00"`.
    pub amount_baht: String,
}

/// Gateway status codes, grouped by how the service reports them.
pub mod codes {
    /// Successful redemption.
    pub const SUCCESS: &str = "SUCCESS";

    /// The voucher has no remaining value.
    pub const ALREADY_REDEEMED: &[&str] =
        &["VOUCHER_OUT_OF_STOCK", "VOUCHER_REDEEMED", "ALREADY_REDEEMED"];

    /// The voucher does not exist or can no longer be used.
    pub const INVALID_VOUCHER: &[&str] =
        &["VOUCHER_NOT_FOUND", "VOUCHER_EXPIRED", "INVALID_VOUCHER"];
}

/// A successful redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redemption {
    /// Credited amount in minor units. Always positive.
    pub amount_cents: i64,
}
