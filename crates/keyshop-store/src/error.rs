//! Error types for keyshop storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found, or not visible to the caller.
    #[error("not found")]
    NotFound,

    /// Insufficient balance for a debit.
    #[error("insufficient balance: balance={balance}, required={required}")]
    InsufficientBalance {
        /// Current balance in minor units.
        balance: i64,
        /// Required amount in minor units.
        required: i64,
    },

    /// No unclaimed key matches the requested map.
    #[error("no stock for map {map}")]
    NoStock {
        /// The requested map.
        map: String,
    },

    /// A different hardware id is bound to the key.
    #[error("hardware id mismatch")]
    HwidMismatch,

    /// A domain rule rejected the mutation.
    #[error("domain error: {0}")]
    Domain(String),
}

impl From<keyshop_core::KeyshopError> for StoreError {
    fn from(err: keyshop_core::KeyshopError) -> Self {
        match err {
            keyshop_core::KeyshopError::InsufficientBalance { balance, required } => {
                Self::InsufficientBalance { balance, required }
            }
            keyshop_core::KeyshopError::HwidMismatch => Self::HwidMismatch,
            other => Self::Domain(other.to_string()),
        }
    }
}
