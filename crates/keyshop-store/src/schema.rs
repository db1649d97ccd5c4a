//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Key records, keyed by `key_id` (ULID).
    pub const KEYS: &str = "keys";

    /// Unique index: `code -> key_id`.
    pub const KEYS_BY_CODE: &str = "keys_by_code";

    /// Index of unclaimed stock, keyed by `key_id`. Value is empty.
    /// ULID order makes the first entry the oldest key.
    pub const PENDING_KEYS: &str = "pending_keys";

    /// Index: keys by owner, keyed by `user_id || key_id`. Value is empty.
    pub const KEYS_BY_OWNER: &str = "keys_by_owner";

    /// User balances, keyed by `user_id`.
    pub const BALANCES: &str = "balances";

    /// Ledger transactions, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: transactions by user, keyed by `user_id || transaction_id`.
    /// Value is empty (index only).
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";

    /// Audit rows, keyed by `log_id` (ULID).
    pub const AUDIT_LOGS: &str = "audit_logs";

    /// Index: audit rows by user, keyed by `user_id || log_id`. Value is empty.
    pub const AUDIT_LOGS_BY_USER: &str = "audit_logs_by_user";

    /// Outbox notifications, keyed by `notification_id` (ULID).
    pub const OUTBOX: &str = "outbox";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::KEYS,
        cf::KEYS_BY_CODE,
        cf::PENDING_KEYS,
        cf::KEYS_BY_OWNER,
        cf::BALANCES,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_USER,
        cf::AUDIT_LOGS,
        cf::AUDIT_LOGS_BY_USER,
        cf::OUTBOX,
    ]
}
