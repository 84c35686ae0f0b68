//! Wallet subsystem
//!
//! Users own exactly one wallet holding two integer ledgers (`hardCurrency`,
//! `softCurrency`). Money moves between wallets only through a transfer:
//!
//! ```text
//! WalletService::transfer
//!   → boundary checks (amount, same account, currency)
//!   → RetryCoordinator   (backoff on LockAcquisitionFailed only)
//!   → TransferExecutor   (begin → lock giver → lock recipient → update × 2 → commit)
//!   → TransferValidator  (giver lookup → funds check → recipient lookup)
//!   → WalletStore        (PostgreSQL or in-memory)
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Balances never go negative**: the funds check runs before any write
//!    and the store rejects negative balances.
//! 2. **Atomic pair update**: both balances change in one transaction or not
//!    at all; every failure after `begin` rolls back.
//! 3. **Fixed lock order**: giver wallet is always locked before recipient.
//! 4. **Retry only contention**: business failures surface on first attempt.

pub mod error;
pub mod executor;
pub mod memory;
pub mod pg_store;
pub mod retry;
pub mod service;
pub mod store;
pub mod types;
pub mod validator;

pub use error::{ServiceError, StoreError, TransferError};
pub use executor::{TransferAttempt, TransferExecutor};
pub use memory::{InMemoryWalletStore, StoreStats};
pub use pg_store::PgWalletStore;
pub use retry::{RetryCoordinator, RetryPolicy};
pub use service::WalletService;
pub use store::{UserWalletStream, WalletStore, WalletTx};
pub use types::{CurrencyType, TransferRequest, UserWallet, Wallet};
pub use validator::{TransferValidator, ValidatedTransfer};
