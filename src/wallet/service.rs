//! Wallet Service
//!
//! User lifecycle, wallet reads, direct credit and the transfer entry point.
//! Transfers go through the boundary checks here, then the retry coordinator.

use futures::StreamExt;
use futures::stream::BoxStream;
use rand::Rng;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::{ServiceError, StoreError, TransferError};
use super::executor::TransferExecutor;
use super::retry::{RetryCoordinator, RetryPolicy};
use super::store::WalletStore;
use super::types::{CurrencyType, TransferRequest, UserWallet, Wallet, is_valid_user_id};

/// Upper bound (exclusive) of the random opening balance per ledger
pub const SEED_BALANCE_MAX: i64 = 2000;

pub struct WalletService {
    store: Arc<dyn WalletStore>,
    coordinator: RetryCoordinator,
    seed_random: bool,
}

impl WalletService {
    pub fn new(store: Arc<dyn WalletStore>, policy: RetryPolicy, seed_random: bool) -> Self {
        let executor = Arc::new(TransferExecutor::new(store.clone()));
        Self {
            coordinator: RetryCoordinator::new(executor, policy),
            store,
            seed_random,
        }
    }

    pub fn store(&self) -> &Arc<dyn WalletStore> {
        &self.store
    }

    pub async fn list_users(&self) -> Result<Vec<UserWallet>, ServiceError> {
        self.store.list_users().await.map_err(|e| {
            error!(error = %e, "Error - Failed to retrieve users from database");
            ServiceError::store("Error - Failed to retrieve users from database", e)
        })
    }

    /// Stream every user with its wallet, for lists too large to collect.
    pub fn stream_users(&self) -> BoxStream<'static, Result<UserWallet, ServiceError>> {
        self.store
            .stream_users()
            .map(|item| {
                item.map_err(|e| {
                    error!(error = %e, "Error - Failed to stream users from database");
                    ServiceError::store("Error - Failed to stream users from database", e)
                })
            })
            .boxed()
    }

    /// Create a user and its wallet in one transaction.
    pub async fn register_user(
        &self,
        firstname: &str,
        lastname: &str,
    ) -> Result<UserWallet, ServiceError> {
        let firstname = firstname.trim();
        let lastname = lastname.trim();
        if firstname.is_empty() {
            return Err(ServiceError::InvalidName("firstname"));
        }
        if lastname.is_empty() {
            return Err(ServiceError::InvalidName("lastname"));
        }

        let user_id = Uuid::new_v4().to_string();
        let wallet = if self.seed_random {
            let mut rng = rand::thread_rng();
            Wallet::new(
                Uuid::new_v4().to_string(),
                rng.gen_range(0..SEED_BALANCE_MAX),
                rng.gen_range(0..SEED_BALANCE_MAX),
            )
        } else {
            Wallet::new(Uuid::new_v4().to_string(), 0, 0)
        };

        let fail = |e: StoreError| {
            error!(error = %e, "Error - Failed to create a new user");
            ServiceError::store("Error - Failed to create a new user", e)
        };

        let mut tx = self.store.begin().await.map_err(fail)?;
        let inserted = async {
            tx.insert_user(&user_id, firstname, lastname).await?;
            tx.insert_wallet(&user_id, &wallet).await
        }
        .await;
        if let Err(e) = inserted {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Failed to rollback user creation");
            }
            return Err(fail(e));
        }
        tx.commit().await.map_err(fail)?;

        info!(user_id = %user_id, wallet_id = %wallet.wallet_id, "User registered");
        Ok(UserWallet {
            user_id,
            firstname: firstname.to_string(),
            lastname: lastname.to_string(),
            wallet: Some(wallet),
        })
    }

    pub async fn get_user_wallet(&self, user_id: &str) -> Result<UserWallet, ServiceError> {
        if !is_valid_user_id(user_id) {
            warn!(user_id, "Invalid user id");
            return Err(ServiceError::InvalidUserId(user_id.to_string()));
        }
        self.fetch_user(user_id).await
    }

    /// Delete a user and its wallet in one transaction.
    pub async fn delete_user(&self, user_id: &str) -> Result<bool, ServiceError> {
        if !is_valid_user_id(user_id) {
            warn!(user_id, "Invalid user id");
            return Err(ServiceError::InvalidUserId(user_id.to_string()));
        }
        let user = self.fetch_user(user_id).await?;

        let fail = |e: StoreError| {
            error!(user_id, error = %e, "Error - Failed to delete user");
            ServiceError::store("Error - Failed to delete user", e)
        };

        let mut tx = self.store.begin().await.map_err(fail)?;
        let deleted = async {
            if let Some(wallet) = &user.wallet {
                tx.delete_wallet(&wallet.wallet_id).await?;
            }
            tx.delete_user(user_id).await
        }
        .await;

        match deleted {
            Ok(0) => {
                if let Err(e) = tx.rollback().await {
                    warn!(error = %e, "Failed to rollback user deletion");
                }
                warn!(user_id, "Impossible to delete the customer - no row affected");
                Err(ServiceError::UserNotFound(user_id.to_string()))
            }
            Ok(_) => {
                tx.commit().await.map_err(fail)?;
                info!(user_id, "User deleted");
                Ok(true)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Failed to rollback user deletion");
                }
                Err(fail(e))
            }
        }
    }

    /// Credit a wallet directly.
    ///
    /// Read-then-write without a transaction or row lock: a concurrent
    /// transfer on the same wallet can overwrite the credit.
    pub async fn add_currency(
        &self,
        user_id: &str,
        currency: &str,
        amount: i64,
    ) -> Result<bool, ServiceError> {
        if amount <= 0 {
            warn!(amount, "Credit amount must be >= 1");
            return Err(ServiceError::InvalidAmount);
        }
        let currency: CurrencyType = currency.parse()?;

        let user = self.fetch_user(user_id).await?;
        let wallet = user.wallet.ok_or_else(|| {
            error!(user_id, "Error - User with no wallet");
            ServiceError::UserHasNoWallet(user_id.to_string())
        })?;

        let Some(new_balance) = wallet.balance(currency).checked_add(amount) else {
            warn!(
                user_id,
                currency = %currency,
                balance = wallet.balance(currency),
                amount,
                "Credit would overflow wallet balance"
            );
            return Err(ServiceError::InvalidAmount);
        };
        let affected = self
            .store
            .update_wallet_balance(&wallet.wallet_id, currency, new_balance)
            .await
            .map_err(|e| {
                error!(wallet_id = %wallet.wallet_id, error = %e, "Error - Failed to update user wallet");
                ServiceError::store("Error - Failed to update user wallet", e)
            })?;
        if affected == 0 {
            return Err(ServiceError::store(
                "Error - Failed to update user wallet",
                StoreError::WalletNotFound(wallet.wallet_id),
            ));
        }

        info!(user_id, currency = %currency, amount, balance = new_balance, "Wallet credited");
        Ok(true)
    }

    /// Transfer `amount` of `currency` from giver to recipient.
    ///
    /// Boundary checks run before any store access.
    pub async fn transfer(
        &self,
        currency: &str,
        giver_id: &str,
        recipient_id: &str,
        amount: i64,
    ) -> Result<bool, TransferError> {
        if amount <= 0 {
            warn!(amount, "Transfer amount must be >= 1");
            return Err(TransferError::InvalidAmount);
        }
        if giver_id == recipient_id {
            warn!(user_id = giver_id, "Giver and recipient are the same user");
            return Err(TransferError::SameAccount);
        }
        for user_id in [giver_id, recipient_id] {
            if !is_valid_user_id(user_id) {
                warn!(user_id, "Invalid user id in transfer");
                return Err(TransferError::InvalidUserId(user_id.to_string()));
            }
        }
        let req = TransferRequest::parse(currency, giver_id, recipient_id, amount).inspect_err(|e| {
            warn!(currency, error = %e, "wrong type of currency");
        })?;
        self.coordinator.execute_with_retry(&req).await
    }

    async fn fetch_user(&self, user_id: &str) -> Result<UserWallet, ServiceError> {
        match self.store.lookup_user_with_wallet(user_id).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(ServiceError::UserNotFound(user_id.to_string())),
            Err(e) => {
                error!(user_id, error = %e, "Error - Failed to fetch user information");
                Err(ServiceError::store("Error - Failed to fetch user information", e))
            }
        }
    }
}
