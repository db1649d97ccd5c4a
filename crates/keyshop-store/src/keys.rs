//! Key encoding utilities for `RocksDB`.
//!
//! Record keys are raw identifier bytes. Secondary indexes concatenate the 16-byte
//! user id with the 16-byte ULID of the indexed record, so a prefix scan over a user
//! yields that user's records in time order.

use keyshop_core::{KeyId, LogId, NotificationId, TransactionId, UserId};

/// Length of a composite `user_id || ulid` index key.
pub const COMPOSITE_KEY_LEN: usize = 32;

/// Create a key record key from a key ID.
#[must_use]
pub fn key_key(key_id: &KeyId) -> Vec<u8> {
    key_id.to_bytes().to_vec()
}

/// Create a code index key.
#[must_use]
pub fn code_key(code: &str) -> Vec<u8> {
    code.as_bytes().to_vec()
}

/// Create a balance key from a user ID.
#[must_use]
pub fn balance_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a transaction key from a transaction ID.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create an audit row key from a log ID.
#[must_use]
pub fn audit_log_key(log_id: &LogId) -> Vec<u8> {
    log_id.to_bytes().to_vec()
}

/// Create an outbox key from a notification ID.
#[must_use]
pub fn notification_key(notification_id: &NotificationId) -> Vec<u8> {
    notification_id.to_bytes().to_vec()
}

/// Create a `user_id || ulid` index key.
#[must_use]
pub fn user_index_key(user_id: &UserId, ulid_bytes: [u8; 16]) -> Vec<u8> {
    let mut key = Vec::with_capacity(COMPOSITE_KEY_LEN);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&ulid_bytes);
    key
}

/// Create a prefix for iterating all index entries of a user.
#[must_use]
pub fn user_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the trailing 16 ULID bytes from a `user_id || ulid` index key.
///
/// Returns `None` if the key has the wrong length.
#[must_use]
pub fn index_suffix(key: &[u8]) -> Option<[u8; 16]> {
    if key.len() != COMPOSITE_KEY_LEN {
        return None;
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..COMPOSITE_KEY_LEN]);
    Some(bytes)
}

/// Decode a 16-byte record key back into its ULID bytes.
#[must_use]
pub fn ulid_bytes(key: &[u8]) -> Option<[u8; 16]> {
    key.try_into().ok()
}
