//! Signing and comparison helpers.
//!
//! Outgoing notifications are signed so the sink can authenticate them, and operator
//! keys are compared without leaking timing information.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the notification signature.
pub const SIGNATURE_HEADER: &str = "x-keyshop-signature";

/// Sign a notification body.
///
/// The signed message is `"{timestamp}.{body}"` and the header value has the form
/// `t={timestamp},v1={hex hmac}`, so the sink can reject replays by timestamp.
///
/// # Panics
///
/// Never panics in practice: HMAC-SHA256 accepts keys of any size.
#[must_use]
pub fn sign_payload(secret: &str, timestamp: i64, body: &[u8]) -> String {
    // INVARIANT: HMAC-SHA256 accepts keys of any size per RFC 2104.
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);

    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time string comparison to prevent timing attacks.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
