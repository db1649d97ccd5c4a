//! `RocksDB` storage layer for keyshop.
//!
//! This crate is the ledger store of record: license keys, user balances, ledger
//! transactions, audit rows and the notification outbox.
//!
//! # Architecture
//!
//! Records are CBOR-encoded and kept in column families (see [`schema::cf`]) with
//! secondary indexes for code uniqueness, unclaimed stock, ownership and per-user
//! history.
//!
//! Every operation that touches more than one record (claiming a key and debiting the
//! buyer, crediting a top-up with its transaction and audit row, activation, resets,
//! deduplicated inserts) reads, checks and writes under a store-wide write lock and
//! commits a single `WriteBatch`. Either every record of the operation is written or
//! none is.
//!
//! # Example
//!
//! ```no_run
//! use keyshop_core::{Key, UserId};
//! use keyshop_store::{RocksStore, Store};
//!
//! let store = RocksStore::open("/tmp/keyshop-db").unwrap();
//!
//! // Stock a key and sell it
//! store.insert_key(&Key::pending("KEY-0001", "loadstring(...)", Vec::new())).unwrap();
//! let buyer = UserId::generate();
//! let result = store.claim_key("forest", &buyer, 10_000);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use std::time::Duration;

use keyshop_core::{
    AuditLog, Key, KeyId, LeaseId, Notification, NotificationId, Transaction, TransactionId,
    UserBalance, UserId, VoucherCode,
};

/// Result of a successful key purchase.
#[derive(Debug, Clone)]
pub struct Claim {
    /// The claimed key, now in `Wait`.
    pub key: Key,
    /// The purchase transaction.
    pub transaction: Transaction,
    /// Buyer balance after the debit.
    pub balance_cents: i64,
}

/// Result of a successful voucher credit.
#[derive(Debug, Clone)]
pub struct Topup {
    /// The top-up transaction.
    pub transaction: Transaction,
    /// The `topup_success` audit row.
    pub log: AuditLog,
    /// Outbox row enqueued with the credit, if requested.
    pub notification: Option<Notification>,
    /// Balance after the credit.
    pub balance_cents: i64,
}

/// Result of a hardware id reset.
#[derive(Debug, Clone, Default)]
pub struct HwidReset {
    /// Keys whose binding was cleared.
    pub keys: Vec<Key>,
    /// Outbox rows enqueued with the reset, if requested.
    pub notifications: Vec<Notification>,
}

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, fault-injecting wrappers in tests).
pub trait Store: Send + Sync {
    // =========================================================================
    // Key Operations
    // =========================================================================

    /// Insert a key unless another key already has the same code.
    ///
    /// Returns `true` if the key was inserted, `false` if its code already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn insert_key(&self, key: &Key) -> Result<bool>;

    /// Get a key by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_key(&self, key_id: &KeyId) -> Result<Option<Key>>;

    /// Get a key by its license code.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_key_by_code(&self, code: &str) -> Result<Option<Key>>;

    /// List the keys owned by a user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_keys_by_owner(&self, owner: &UserId) -> Result<Vec<Key>>;

    /// List unclaimed stock, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_pending_keys(&self) -> Result<Vec<Key>>;

    // =========================================================================
    // Balance and Ledger Operations
    // =========================================================================

    /// Get a user's balance record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_balance(&self, user_id: &UserId) -> Result<Option<UserBalance>>;

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Transaction>>;

    /// List transactions for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>>;

    // =========================================================================
    // Audit Operations
    // =========================================================================

    /// Append an audit row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_audit_log(&self, log: &AuditLog) -> Result<()>;

    /// List a user's audit rows, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_audit_logs_by_user(&self, user_id: &UserId) -> Result<Vec<AuditLog>>;

    // =========================================================================
    // Outbox Operations
    // =========================================================================

    /// Get an outbox row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_notification(&self, id: &NotificationId) -> Result<Option<Notification>>;

    /// Insert or update an outbox row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_notification(&self, notification: &Notification) -> Result<()>;

    /// List outbox rows that are pending or dead-lettered, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_undelivered_notifications(&self) -> Result<Vec<Notification>>;

    /// Lease an outbox row for delivery.
    ///
    /// Returns `None` when the row is missing, delivered, dead-lettered (unless
    /// `requeue` is set, which resets it to pending) or leased by someone else.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn claim_notification(
        &self,
        id: &NotificationId,
        requeue: bool,
        ttl: Duration,
    ) -> Result<Option<Notification>>;

    /// Write back a leased row if `token` still holds its lease.
    ///
    /// Returns `false` without writing when the lease was lost.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn settle_notification(&self, notification: &Notification, token: &LeaseId) -> Result<bool>;

    // =========================================================================
    // Compound Operations
    // =========================================================================

    /// Activate the `Wait` key with `code` owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no key matches code, owner and status.
    fn activate_key(&self, code: &str, owner: &UserId) -> Result<Key>;

    /// Claim the oldest unclaimed key matching `map_name` for `owner`, debiting
    /// `price_cents` and recording a purchase transaction atomically.
    ///
    /// # Errors
    ///
    /// - `StoreError::InsufficientBalance` if the buyer cannot afford the key; no key
    ///   is touched.
    /// - `StoreError::NoStock` if no unclaimed key matches.
    fn claim_key(&self, map_name: &str, owner: &UserId, price_cents: i64) -> Result<Claim>;

    /// Bind `hwid` to the active key with `code` on first execution.
    ///
    /// Returns the key and whether this call performed the binding.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the code is unknown or the key is not active.
    /// - `StoreError::HwidMismatch` if a different hardware id is bound.
    fn bind_hwid(&self, code: &str, hwid: &str) -> Result<(Key, bool)>;

    /// Clear the hardware id of `key_id` if it is owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the key does not exist or is owned by
    /// someone else.
    fn reset_hwid(&self, key_id: &KeyId, owner: &UserId, notify: bool) -> Result<HwidReset>;

    /// Clear the hardware id of every key owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user owns no keys.
    fn reset_hwids_for_owner(&self, owner: &UserId, notify: bool) -> Result<HwidReset>;

    /// Credit a redeemed voucher: balance increment, top-up transaction,
    /// `topup_success` audit row and optional outbox row in one atomic write.
    ///
    /// # Errors
    ///
    /// Returns an error if the amount is not positive or the write fails; nothing is
    /// written in that case.
    fn credit_topup(
        &self,
        user_id: &UserId,
        amount_cents: i64,
        voucher: &VoucherCode,
        notify: bool,
    ) -> Result<Topup>;
}
