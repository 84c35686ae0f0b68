//! Wallet Service - users, wallets and atomic money transfers
//!
//! # Modules
//!
//! - [`wallet`] - Wallet domain: store seam, validator, executor, retry coordinator
//! - [`db`] - PostgreSQL connection pool lifecycle
//! - [`gateway`] - HTTP API (axum), JWT checks, OpenAPI docs
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;
pub mod wallet;

// Convenient re-exports at crate root
pub use wallet::{
    CurrencyType, InMemoryWalletStore, PgWalletStore, RetryCoordinator, RetryPolicy,
    ServiceError, StoreError, TransferError, TransferExecutor, TransferRequest, UserWallet,
    Wallet, WalletService, WalletStore,
};
