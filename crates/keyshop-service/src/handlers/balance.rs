//! Balance and transaction handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use keyshop_core::{format_amount, to_major_units, Transaction, TransactionType};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Largest accepted page size.
const MAX_PAGE_SIZE: usize = 100;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Balance in major units.
    pub balance: f64,
    /// Balance in minor units.
    pub balance_cents: i64,
    /// Balance formatted for display.
    pub balance_formatted: String,
}

/// Get the caller's balance. A user without a balance record has zero.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance_cents = state
        .store
        .get_balance(&auth.user_id)?
        .map_or(0, |b| b.balance_cents);

    Ok(Json(BalanceResponse {
        balance: to_major_units(balance_cents),
        balance_cents,
        balance_formatted: format_amount(balance_cents),
    }))
}

/// Transaction list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Maximum number of transactions to return (default: 50).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// Transaction response.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: String,
    /// Amount in minor units (positive = credit, negative = debit).
    pub amount_cents: i64,
    /// Amount in major units.
    pub amount: f64,
    /// Transaction type.
    pub transaction_type: TransactionType,
    /// Balance after this transaction.
    pub balance_after_cents: i64,
    /// Description.
    pub description: String,
    /// Redeemed voucher, for top-ups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voucher_code: Option<String>,
    /// Bought key, for purchases.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    /// Timestamp.
    pub created_at: String,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id.to_string(),
            amount_cents: tx.amount_cents,
            amount: to_major_units(tx.amount_cents),
            transaction_type: tx.transaction_type,
            balance_after_cents: tx.balance_after_cents,
            description: tx.description,
            voucher_code: tx.voucher_code,
            key_id: tx.key_id.map(|id| id.to_string()),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// List transactions response.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Transactions (newest first).
    pub transactions: Vec<TransactionResponse>,
    /// Whether there are more transactions.
    pub has_more: bool,
}

/// List the caller's transaction history.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    // Fetch one more than requested to determine has_more
    let limit = query.limit.min(MAX_PAGE_SIZE);
    let mut transactions =
        state
            .store
            .list_transactions_by_user(&auth.user_id, limit + 1, query.offset)?;

    let has_more = transactions.len() > limit;
    transactions.truncate(limit);

    Ok(Json(ListTransactionsResponse {
        transactions: transactions
            .into_iter()
            .map(TransactionResponse::from)
            .collect(),
        has_more,
    }))
}
