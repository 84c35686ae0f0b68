//! Transfer Executor
//!
//! One transfer attempt: validate, compute both balances (an overflowing
//! recipient balance is rejected here), open a transaction, lock giver then
//! recipient, write both balances, commit. Once the transaction is open every
//! failure rolls it back before being reported.
//!
//! # Lock order
//!
//! Locks are always taken giver first. Two transfers moving funds in opposite
//! directions between the same pair can still wait on each other; the store
//! breaks that cycle by failing one lock request (deadlock detection or lock
//! timeout), which surfaces as the retryable `LockAcquisitionFailed`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::error::{StoreError, TransferError};
use super::store::{WalletStore, WalletTx};
use super::types::TransferRequest;
use super::validator::TransferValidator;

/// A single, non-retrying transfer attempt
#[async_trait]
pub trait TransferAttempt: Send + Sync {
    async fn execute(&self, req: &TransferRequest) -> Result<bool, TransferError>;
}

pub struct TransferExecutor {
    store: Arc<dyn WalletStore>,
    validator: TransferValidator,
}

impl TransferExecutor {
    pub fn new(store: Arc<dyn WalletStore>) -> Self {
        Self {
            validator: TransferValidator::new(store.clone()),
            store,
        }
    }
}

/// Roll back after a failed step and hand the failure back.
async fn abort(tx: Box<dyn WalletTx>, err: TransferError) -> TransferError {
    if let Err(e) = tx.rollback().await {
        error!(error = %e, cause = %err, "Failed to rollback transfer transaction");
    }
    err
}

async fn lock_wallet(tx: &mut dyn WalletTx, wallet_id: &str) -> Result<(), TransferError> {
    let source = match tx.lock_wallet_for_update(wallet_id).await {
        Ok(true) => return Ok(()),
        Ok(false) => StoreError::WalletNotFound(wallet_id.to_string()),
        Err(e) => e,
    };
    error!(wallet_id, error = %source, "Error - Lock - Failed to acquire locks on wallets");
    Err(TransferError::LockAcquisitionFailed {
        wallet_id: wallet_id.to_string(),
        source,
    })
}

#[async_trait]
impl TransferAttempt for TransferExecutor {
    async fn execute(&self, req: &TransferRequest) -> Result<bool, TransferError> {
        let validated = self.validator.validate(req).await.map_err(|e| {
            debug!(error = %e, "Transfer rejected by validation");
            TransferError::ParamsValidationFailed {
                source: Box::new(e),
            }
        })?;
        let giver = &validated.giver;
        let recipient = &validated.recipient;

        let giver_new_balance = giver.balance(req.currency) - req.amount;
        let recipient_new_balance = recipient
            .balance(req.currency)
            .checked_add(req.amount)
            .ok_or_else(|| {
                warn!(
                    wallet_id = %recipient.wallet_id,
                    balance = recipient.balance(req.currency),
                    amount = req.amount,
                    "Recipient balance would overflow"
                );
                TransferError::BalanceOverflow {
                    wallet_id: recipient.wallet_id.clone(),
                    balance: recipient.balance(req.currency),
                    amount: req.amount,
                }
            })?;

        let mut tx = self.store.begin().await.map_err(|e| {
            error!(error = %e, "Failed to create database transaction");
            TransferError::TransactionOpenFailed(e)
        })?;

        if let Err(e) = lock_wallet(tx.as_mut(), &giver.wallet_id).await {
            return Err(abort(tx, e).await);
        }
        if let Err(e) = lock_wallet(tx.as_mut(), &recipient.wallet_id).await {
            return Err(abort(tx, e).await);
        }

        match tx
            .update_wallet_balance(&giver.wallet_id, req.currency, giver_new_balance)
            .await
        {
            Ok(0) => {
                let source = StoreError::WalletNotFound(giver.wallet_id.clone());
                error!(wallet_id = %giver.wallet_id, "Failed to update giver wallet: not found");
                let err = TransferError::GiverUpdateFailed {
                    wallet_id: giver.wallet_id.clone(),
                    source,
                };
                return Err(abort(tx, err).await);
            }
            Ok(_) => {}
            Err(source) => {
                error!(wallet_id = %giver.wallet_id, error = %source, "Failed to update giver wallet");
                let err = TransferError::GiverUpdateFailed {
                    wallet_id: giver.wallet_id.clone(),
                    source,
                };
                return Err(abort(tx, err).await);
            }
        }

        match tx
            .update_wallet_balance(&recipient.wallet_id, req.currency, recipient_new_balance)
            .await
        {
            Ok(0) => {
                let source = StoreError::WalletNotFound(recipient.wallet_id.clone());
                error!(wallet_id = %recipient.wallet_id, "Failed to update recipient wallet: not found");
                let err = TransferError::RecipientUpdateFailed {
                    wallet_id: recipient.wallet_id.clone(),
                    source,
                };
                return Err(abort(tx, err).await);
            }
            Ok(_) => {}
            Err(source) => {
                error!(wallet_id = %recipient.wallet_id, error = %source, "Failed to update recipient wallet");
                let err = TransferError::RecipientUpdateFailed {
                    wallet_id: recipient.wallet_id.clone(),
                    source,
                };
                return Err(abort(tx, err).await);
            }
        }

        tx.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit transfer transaction");
            TransferError::CommitFailed(e)
        })?;

        info!(
            giver_id = %req.giver_id,
            recipient_id = %req.recipient_id,
            currency = %req.currency,
            amount = req.amount,
            giver_balance = giver_new_balance,
            recipient_balance = recipient_new_balance,
            "Transfer committed"
        );
        Ok(true)
    }
}
