//! Transfer Validator
//!
//! Admissibility check run before any transaction is opened. Balances are read
//! without locks, so the funds check is advisory: the executor applies its
//! updates from this same snapshot.

use std::sync::Arc;
use tracing::{error, warn};

use super::error::{StoreError, TransferError};
use super::store::WalletStore;
use super::types::{TransferRequest, Wallet};

/// Wallets as read by a successful validation, balances not yet updated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTransfer {
    pub giver: Wallet,
    pub recipient: Wallet,
}

pub struct TransferValidator {
    store: Arc<dyn WalletStore>,
}

impl TransferValidator {
    pub fn new(store: Arc<dyn WalletStore>) -> Self {
        Self { store }
    }

    /// Check a transfer request against current balances.
    ///
    /// The giver is fully checked (including funds) before the recipient is
    /// looked up, so an overdraft never costs a second lookup.
    pub async fn validate(&self, req: &TransferRequest) -> Result<ValidatedTransfer, TransferError> {
        let giver = self.fetch_wallet(&req.giver_id).await?;

        let giver_new_balance = giver.balance(req.currency) - req.amount;
        if giver_new_balance < 0 {
            warn!(
                giver_id = %req.giver_id,
                currency = %req.currency,
                balance = giver.balance(req.currency),
                amount = req.amount,
                "Error - Insufficient funds in giver wallet"
            );
            return Err(TransferError::InsufficientFunds {
                balance: giver.balance(req.currency),
                amount: req.amount,
            });
        }

        let recipient = self.fetch_wallet(&req.recipient_id).await?;

        Ok(ValidatedTransfer { giver, recipient })
    }

    /// Same as [`validate`](Self::validate) for a currency name that has not
    /// been parsed yet. An unknown currency fails before any lookup.
    pub async fn validate_raw(
        &self,
        currency: &str,
        giver_id: &str,
        recipient_id: &str,
        amount: i64,
    ) -> Result<ValidatedTransfer, TransferError> {
        let req = TransferRequest::parse(currency, giver_id, recipient_id, amount)?;
        self.validate(&req).await
    }

    async fn fetch_wallet(&self, user_id: &str) -> Result<Wallet, TransferError> {
        let user = match self.store.lookup_user_with_wallet(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(user_id, "Impossible to get user info: not found");
                return Err(TransferError::UserLookupFailed {
                    user_id: user_id.to_string(),
                    source: StoreError::UserNotFound(user_id.to_string()),
                });
            }
            Err(e) => {
                error!(user_id, error = %e, "Impossible to get user info");
                return Err(TransferError::UserLookupFailed {
                    user_id: user_id.to_string(),
                    source: e,
                });
            }
        };

        user.wallet.ok_or_else(|| {
            warn!(user_id, "User with no wallet");
            TransferError::UserHasNoWallet(user_id.to_string())
        })
    }
}
