//! Wallet Store contract
//!
//! Storage seam for users and wallets. Two implementations:
//! - [`PgWalletStore`](super::pg_store::PgWalletStore): PostgreSQL via sqlx
//! - [`InMemoryWalletStore`](super::memory::InMemoryWalletStore): process-local,
//!   with the same row-lock semantics
//!
//! # Locking
//!
//! `WalletTx::lock_wallet_for_update` has `SELECT ... FOR UPDATE` semantics:
//! it blocks until the row lock is granted (or the store gives up) and holds
//! it until the transaction is committed, rolled back or dropped.

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::error::StoreError;
use super::types::{CurrencyType, UserWallet, Wallet};

/// Users with wallets, yielded one row at a time
pub type UserWalletStream = BoxStream<'static, Result<UserWallet, StoreError>>;

/// Shared store handle
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Store name for logging
    fn name(&self) -> &'static str;

    /// Cheap round trip proving the store is usable
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Point lookup of a user joined with its wallet.
    ///
    /// `Ok(None)` when the user does not exist.
    async fn lookup_user_with_wallet(&self, user_id: &str)
    -> Result<Option<UserWallet>, StoreError>;

    /// All users that own a wallet
    async fn list_users(&self) -> Result<Vec<UserWallet>, StoreError>;

    /// Same rows as [`list_users`](Self::list_users), without collecting them.
    ///
    /// The stream owns its resources and ends after the first error.
    fn stream_users(&self) -> UserWalletStream;

    /// Non-transactional balance write, outside any row lock.
    ///
    /// Returns the number of affected rows.
    async fn update_wallet_balance(
        &self,
        wallet_id: &str,
        currency: CurrencyType,
        new_balance: i64,
    ) -> Result<u64, StoreError>;

    /// Open a new transaction
    async fn begin(&self) -> Result<Box<dyn WalletTx>, StoreError>;
}

/// Open transaction
///
/// Dropping a transaction without `commit` discards its writes and releases
/// its locks.
#[async_trait]
pub trait WalletTx: Send {
    /// Acquire an exclusive row lock on a wallet.
    ///
    /// Returns `false` when no such wallet row exists.
    async fn lock_wallet_for_update(&mut self, wallet_id: &str) -> Result<bool, StoreError>;

    /// Transactional balance write. Returns the number of affected rows.
    async fn update_wallet_balance(
        &mut self,
        wallet_id: &str,
        currency: CurrencyType,
        new_balance: i64,
    ) -> Result<u64, StoreError>;

    async fn insert_user(
        &mut self,
        user_id: &str,
        firstname: &str,
        lastname: &str,
    ) -> Result<(), StoreError>;

    async fn insert_wallet(&mut self, user_id: &str, wallet: &Wallet) -> Result<(), StoreError>;

    /// Returns the number of deleted rows
    async fn delete_wallet(&mut self, wallet_id: &str) -> Result<u64, StoreError>;

    /// Returns the number of deleted rows
    async fn delete_user(&mut self, user_id: &str) -> Result<u64, StoreError>;

    /// Commit and release the transaction
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Roll back and release the transaction
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
