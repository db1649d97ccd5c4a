//! Ledger transaction types.
//!
//! Every change to a user's balance creates exactly one transaction record, written in
//! the same atomic batch as the balance change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{KeyId, TransactionId, UserId};

/// A ledger transaction representing a balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// Amount in minor units. Positive = credit, negative = debit.
    pub amount_cents: i64,

    /// Type of transaction.
    pub transaction_type: TransactionType,

    /// Balance after this transaction (in minor units).
    pub balance_after_cents: i64,

    /// Human-readable description.
    pub description: String,

    /// Voucher redeemed for a top-up.
    pub voucher_code: Option<String>,

    /// Key bought by a purchase.
    pub key_id: Option<KeyId>,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a top-up (credit) transaction for a redeemed voucher.
    #[must_use]
    pub fn topup(
        user_id: UserId,
        amount_cents: i64,
        balance_after_cents: i64,
        voucher_code: impl Into<String>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            amount_cents: amount_cents.abs(),
            transaction_type: TransactionType::Topup,
            balance_after_cents,
            description: "TrueMoney voucher top-up".to_string(),
            voucher_code: Some(voucher_code.into()),
            key_id: None,
            created_at: Utc::now(),
        }
    }

    /// Create a purchase (debit) transaction for a claimed key.
    #[must_use]
    pub fn purchase(
        user_id: UserId,
        price_cents: i64,
        balance_after_cents: i64,
        key_id: KeyId,
        map_name: &str,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            amount_cents: -price_cents.abs(), // Always negative for purchases
            transaction_type: TransactionType::Purchase,
            balance_after_cents,
            description: format!("Key purchase for map {map_name}"),
            voucher_code: None,
            key_id: Some(key_id),
            created_at: Utc::now(),
        }
    }
}

/// Type of ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Balance credited from a redeemed voucher.
    Topup,

    /// Balance debited for a key purchase.
    Purchase,
}

impl TransactionType {
    /// Check if this transaction type adds to the balance.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self, Self::Topup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topup_transaction_is_positive() {
        let user_id = UserId::generate();
        let tx = Transaction::topup(user_id, 5000, 5000, "ABCDEFGHIJ12345678");

        assert_eq!(tx.amount_cents, 5000);
        assert_eq!(tx.transaction_type, TransactionType::Topup);
        assert_eq!(tx.voucher_code.as_deref(), Some("ABCDEFGHIJ12345678"));
        assert!(tx.key_id.is_none());
    }

    #[test]
    fn purchase_transaction_is_negative() {
        let user_id = UserId::generate();
        let key_id = KeyId::generate();
        let tx = Transaction::purchase(user_id, 10_000, 0, key_id, "forest");

        assert_eq!(tx.amount_cents, -10_000);
        assert_eq!(tx.transaction_type, TransactionType::Purchase);
        assert_eq!(tx.key_id, Some(key_id));
        assert!(tx.description.contains("forest"));
    }

    #[test]
    fn transaction_type_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&TransactionType::Topup).unwrap(),
            "\"topup\""
        );
        assert!(TransactionType::Topup.is_credit());
        assert!(!TransactionType::Purchase.is_credit());
    }
}
