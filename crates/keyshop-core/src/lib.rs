//! Core types for keyshop.
//!
//! This crate provides the domain types of the key storefront:
//!
//! - **Identifiers**: `UserId`, `KeyId`, `TransactionId`, `LogId`, `NotificationId`
//! - **Keys**: `Key`, `KeyStatus` and the `Pending -> Wait -> Active` lifecycle
//! - **Money**: `UserBalance`, `Transaction`, `TransactionType`, `PricingConfig`
//! - **Audit**: `AuditLog`, `AuditAction`
//! - **Outbox**: `Notification`, `NotificationEvent`, `DeliveryStatus`
//! - **Vouchers**: `VoucherCode`
//!
//! # Money
//!
//! Amounts are `i64` minor units: 1 currency unit = 100 minor units. A key priced at
//! 100 units is stored as `10_000`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod audit;
pub mod balance;
pub mod error;
pub mod ids;
pub mod key;
pub mod ledger;
pub mod notification;
pub mod pricing;
pub mod voucher;

pub use audit::{AuditAction, AuditLog};
pub use balance::{format_amount, parse_amount_cents, to_major_units, UserBalance};
pub use error::{KeyshopError, Result};
pub use ids::{IdError, KeyId, LeaseId, LogId, NotificationId, TransactionId, UserId};
pub use key::{is_valid_hwid, Key, KeyStatus, MAX_HWID_LEN};
pub use ledger::{Transaction, TransactionType};
pub use notification::{DeliveryStatus, Lease, Notification, NotificationEvent};
pub use pricing::{PricingConfig, DEFAULT_KEY_PRICE_CENTS};
pub use voucher::{VoucherCode, VOUCHER_CODE_LEN};
