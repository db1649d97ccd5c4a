//! Error types for keyshop domain rules.

use crate::ids::IdError;
use crate::key::KeyStatus;

/// Result type for keyshop domain operations.
pub type Result<T> = std::result::Result<T, KeyshopError>;

/// Errors raised by domain transitions and validation.
#[derive(Debug, thiserror::Error)]
pub enum KeyshopError {
    /// Balance too low for the requested debit.
    #[error("insufficient balance: balance={balance}, required={required}")]
    InsufficientBalance {
        /// Current balance in minor units.
        balance: i64,
        /// Required amount in minor units.
        required: i64,
    },

    /// The key is not in a state that allows the requested transition.
    #[error("invalid key transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: KeyStatus,
        /// Requested status.
        to: KeyStatus,
    },

    /// A different hardware id is already bound to the key.
    #[error("hardware id mismatch")]
    HwidMismatch,

    /// Voucher code does not match the required format.
    #[error("invalid voucher code format")]
    InvalidVoucherFormat,

    /// Invalid monetary amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
