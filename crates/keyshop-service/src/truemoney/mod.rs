//! TrueMoney gift voucher gateway.
//!
//! A voucher code is redeemed into the shop's wallet and the credited amount is
//! reported back for the balance top-up.

pub mod client;
pub mod types;

pub use client::{GatewayError, TrueMoneyClient};
pub use types::Redemption;
