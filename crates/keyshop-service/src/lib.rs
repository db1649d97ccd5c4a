//! Keyshop HTTP API Service.
//!
//! This crate provides the HTTP API for the keyshop storefront, including:
//!
//! - Key verification, purchase, execution and hardware id resets
//! - Balances, transaction history and TrueMoney voucher top-ups
//! - Operator endpoints for provisioning, upstream key sync and outbox replay
//!
//! # Authentication
//!
//! The service supports two authentication methods:
//!
//! 1. **Bearer JWTs** - Issued by the auth provider, validated with a shared HS256
//!    secret. A token whose `app_metadata.role` is `admin` also grants operator access.
//! 2. **Operator key** - The `x-admin-key` header, for scripts and other deployments.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for the router

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod notify;
pub mod routes;
pub mod state;
pub mod sync;
pub mod truemoney;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use notify::{Notifier, NotifierSettings, ReplaySummary};
pub use routes::create_router;
pub use state::AppState;
pub use sync::{sync_keys, HttpKeySource, KeySource, StoreKeySource, SyncOutcome};
pub use truemoney::{GatewayError, TrueMoneyClient};
