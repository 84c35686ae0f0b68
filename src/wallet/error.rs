//! Wallet error types
//!
//! Three layers, each wrapping the one below as its `source`:
//! - [`StoreError`]: raw storage failures
//! - [`TransferError`]: transfer validation / execution / retry failures
//! - [`ServiceError`]: user and direct-credit operations

use thiserror::Error;

/// Storage layer errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Lock wait timed out on wallet {0}")]
    LockTimeout(String),

    #[error("Deadlock detected while locking wallet {0}")]
    Deadlock(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Transfer error types
///
/// Only [`TransferError::LockAcquisitionFailed`] is transient; everything else
/// is reported to the caller without retry.
#[derive(Error, Debug)]
pub enum TransferError {
    // === Boundary Errors ===
    #[error("Wrong type of currency: {0}")]
    InvalidCurrency(String),

    #[error("Giver and recipient cannot be the same user")]
    SameAccount,

    #[error("The transfer amount should be a number and >= 1")]
    InvalidAmount,

    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    // === Validation Errors ===
    #[error("Impossible to get user info for {user_id}: {source}")]
    UserLookupFailed {
        user_id: String,
        #[source]
        source: StoreError,
    },

    #[error("User with no wallet: {0}")]
    UserHasNoWallet(String),

    #[error("Insufficient funds in giver wallet (balance {balance}, amount {amount})")]
    InsufficientFunds { balance: i64, amount: i64 },

    #[error("Recipient wallet {wallet_id} cannot hold {amount} more (balance {balance})")]
    BalanceOverflow {
        wallet_id: String,
        balance: i64,
        amount: i64,
    },

    #[error("Failed to retrieve recipient - giver informations: {source}")]
    ParamsValidationFailed {
        #[source]
        source: Box<TransferError>,
    },

    // === Execution Errors ===
    #[error("Failed to create database transaction: {0}")]
    TransactionOpenFailed(#[source] StoreError),

    #[error("Lock - Failed to acquire lock on wallet {wallet_id}: {source}")]
    LockAcquisitionFailed {
        wallet_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to update giver wallet {wallet_id}: {source}")]
    GiverUpdateFailed {
        wallet_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to update recipient wallet {wallet_id}: {source}")]
    RecipientUpdateFailed {
        wallet_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to commit transfer transaction: {0}")]
    CommitFailed(#[source] StoreError),

    // === Retry Errors ===
    #[error("Transfer failed - Max retry attempt reached ({attempts} attempts): {source}")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        source: Box<TransferError>,
    },
}

impl TransferError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InvalidCurrency(_) => "INVALID_CURRENCY",
            TransferError::SameAccount => "SAME_ACCOUNT",
            TransferError::InvalidAmount => "INVALID_AMOUNT",
            TransferError::InvalidUserId(_) => "INVALID_USER_ID",
            TransferError::UserLookupFailed { .. } => "USER_LOOKUP_FAILED",
            TransferError::UserHasNoWallet(_) => "USER_HAS_NO_WALLET",
            TransferError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            TransferError::BalanceOverflow { .. } => "BALANCE_OVERFLOW",
            TransferError::ParamsValidationFailed { .. } => "PARAMS_VALIDATION_FAILED",
            TransferError::TransactionOpenFailed(_) => "TRANSACTION_OPEN_FAILED",
            TransferError::LockAcquisitionFailed { .. } => "LOCK_ACQUISITION_FAILED",
            TransferError::GiverUpdateFailed { .. } => "GIVER_UPDATE_FAILED",
            TransferError::RecipientUpdateFailed { .. } => "RECIPIENT_UPDATE_FAILED",
            TransferError::CommitFailed(_) => "COMMIT_FAILED",
            TransferError::MaxRetriesExceeded { .. } => "MAX_RETRIES_EXCEEDED",
        }
    }

    /// Get HTTP status code suggestion
    ///
    /// Wrapping variants report the status of the failure they wrap.
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::InvalidCurrency(_)
            | TransferError::SameAccount
            | TransferError::InvalidAmount
            | TransferError::InvalidUserId(_) => 400,
            TransferError::UserLookupFailed { source, .. } => match source {
                StoreError::UserNotFound(_) => 404,
                _ => 500,
            },
            TransferError::UserHasNoWallet(_)
            | TransferError::InsufficientFunds { .. }
            | TransferError::BalanceOverflow { .. } => 422,
            TransferError::ParamsValidationFailed { source } => source.http_status(),
            TransferError::TransactionOpenFailed(_)
            | TransferError::GiverUpdateFailed { .. }
            | TransferError::RecipientUpdateFailed { .. }
            | TransferError::CommitFailed(_) => 500,
            TransferError::LockAcquisitionFailed { .. }
            | TransferError::MaxRetriesExceeded { .. } => 503,
        }
    }

    /// Whether a retry can be expected to succeed (lock contention only)
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::LockAcquisitionFailed { .. })
    }

    /// Strip `ParamsValidationFailed` wrappers down to the business failure.
    pub fn validation_cause(&self) -> &TransferError {
        match self {
            TransferError::ParamsValidationFailed { source } => source.validation_cause(),
            other => other,
        }
    }
}

/// User / wallet service errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid {0}: must be a non-empty string")]
    InvalidName(&'static str),

    #[error("This userId {0} is not valid")]
    InvalidUserId(String),

    #[error("The amount should be a number and >= 1")]
    InvalidAmount,

    #[error("Wrong type of currency: {0}")]
    InvalidCurrency(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("User with no wallet: {0}")]
    UserHasNoWallet(String),

    #[error("{context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: StoreError,
    },
}

impl ServiceError {
    pub fn store(context: &'static str, source: StoreError) -> Self {
        ServiceError::Store { context, source }
    }

    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidName(_) => "INVALID_NAME",
            ServiceError::InvalidUserId(_) => "INVALID_USER_ID",
            ServiceError::InvalidAmount => "INVALID_AMOUNT",
            ServiceError::InvalidCurrency(_) => "INVALID_CURRENCY",
            ServiceError::UserNotFound(_) => "USER_NOT_FOUND",
            ServiceError::UserHasNoWallet(_) => "USER_HAS_NO_WALLET",
            ServiceError::Store { .. } => "DATABASE_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::InvalidName(_)
            | ServiceError::InvalidAmount
            | ServiceError::InvalidCurrency(_) => 400,
            ServiceError::InvalidUserId(_) | ServiceError::UserNotFound(_) => 404,
            ServiceError::UserHasNoWallet(_) => 422,
            ServiceError::Store { .. } => 500,
        }
    }
}

impl From<TransferError> for ServiceError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::InvalidCurrency(c) => ServiceError::InvalidCurrency(c),
            TransferError::InvalidAmount => ServiceError::InvalidAmount,
            TransferError::InvalidUserId(id) => ServiceError::InvalidUserId(id),
            TransferError::UserHasNoWallet(id) => ServiceError::UserHasNoWallet(id),
            TransferError::UserLookupFailed {
                source: StoreError::UserNotFound(id),
                ..
            } => ServiceError::UserNotFound(id),
            TransferError::UserLookupFailed { source, .. } => {
                ServiceError::store("Error - Failed to fetch user information", source)
            }
            other => ServiceError::store(
                "Error - Unexpected transfer failure",
                StoreError::Unavailable(other.to_string()),
            ),
        }
    }
}
