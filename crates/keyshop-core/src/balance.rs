//! Per-user balances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KeyshopError, Result};
use crate::UserId;

/// A user's spendable balance.
///
/// Stored as `i64` minor units (1 unit = 100 minor units) to avoid floating point
/// drift. A missing balance record is equivalent to a zero balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBalance {
    /// The owning user.
    pub user_id: UserId,

    /// Current balance in minor units. Never negative.
    pub balance_cents: i64,

    /// When the balance was last changed.
    pub updated_at: DateTime<Utc>,
}

impl UserBalance {
    /// Create a zero balance for `user_id`.
    #[must_use]
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            balance_cents: 0,
            updated_at: Utc::now(),
        }
    }

    /// Add a positive amount.
    ///
    /// # Errors
    ///
    /// Returns `KeyshopError::InvalidAmount` for non-positive amounts or overflow.
    pub fn credit(&mut self, amount_cents: i64) -> Result<i64> {
        if amount_cents <= 0 {
            return Err(KeyshopError::InvalidAmount(format!(
                "credit must be positive, got {amount_cents}"
            )));
        }
        self.balance_cents = self
            .balance_cents
            .checked_add(amount_cents)
            .ok_or_else(|| KeyshopError::InvalidAmount("balance overflow".into()))?;
        self.updated_at = Utc::now();
        Ok(self.balance_cents)
    }

    /// Subtract a positive amount, refusing to go below zero.
    ///
    /// # Errors
    ///
    /// - `KeyshopError::InvalidAmount` for non-positive amounts.
    /// - `KeyshopError::InsufficientBalance` if the balance is too low.
    pub fn debit(&mut self, amount_cents: i64) -> Result<i64> {
        if amount_cents <= 0 {
            return Err(KeyshopError::InvalidAmount(format!(
                "debit must be positive, got {amount_cents}"
            )));
        }
        if self.balance_cents < amount_cents {
            return Err(KeyshopError::InsufficientBalance {
                balance: self.balance_cents,
                required: amount_cents,
            });
        }
        self.balance_cents -= amount_cents;
        self.updated_at = Utc::now();
        Ok(self.balance_cents)
    }
}

/// Format minor units as a major-unit amount for display (`12345` -> `123.45`).
#[must_use]
pub fn format_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Convert minor units into a JSON-friendly major-unit number.
#[must_use]
#[allow(clippy::cast_precision_loss)] // amounts are far below 2^53
pub fn to_major_units(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Parse a decimal amount string (`"50"`, `"50.5"`, `"50.00"`) into minor units.
///
/// Returns `None` for anything that is not a plain non-negative decimal with at most
/// two fractional digits.
#[must_use]
pub fn parse_amount_cents(input: &str) -> Option<i64> {
    let input = input.trim();
    let (whole, frac) = match input.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (input, ""),
    };
    if whole.is_empty()
        || frac.len() > 2
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !frac.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(frac)
}
