//! API handlers.

pub mod admin;
pub mod balance;
pub mod health;
pub mod keys;
pub mod topup;
