//! Wallet domain types
//!
//! A wallet holds two independent integer ledgers. Currency selection is a
//! closed enum: anything else is rejected at the parse boundary with
//! [`TransferError::InvalidCurrency`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use super::error::TransferError;

/// Length of a canonical hyphenated UUID, the only accepted user id shape.
pub const USER_ID_LEN: usize = 36;

/// Currency ledger selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum CurrencyType {
    #[serde(rename = "hardCurrency")]
    HardCurrency,
    #[serde(rename = "softCurrency")]
    SoftCurrency,
}

impl CurrencyType {
    pub const ALL: [CurrencyType; 2] = [CurrencyType::HardCurrency, CurrencyType::SoftCurrency];

    /// Wire name used by the HTTP API
    pub fn as_str(&self) -> &'static str {
        match self {
            CurrencyType::HardCurrency => "hardCurrency",
            CurrencyType::SoftCurrency => "softCurrency",
        }
    }

    /// Column name in the `wallet` table
    pub fn column(&self) -> &'static str {
        match self {
            CurrencyType::HardCurrency => "hard_currency",
            CurrencyType::SoftCurrency => "soft_currency",
        }
    }
}

impl fmt::Display for CurrencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CurrencyType {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CurrencyType::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| TransferError::InvalidCurrency(s.to_string()))
    }
}

/// Wallet row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    #[schema(example = "5b0b6c1e-3f1d-4c55-9d0e-6a1b2c3d4e5f")]
    pub wallet_id: String,
    #[schema(example = 2000)]
    pub hard_currency: i64,
    #[schema(example = 150)]
    pub soft_currency: i64,
}

impl Wallet {
    pub fn new(wallet_id: impl Into<String>, hard_currency: i64, soft_currency: i64) -> Self {
        Self {
            wallet_id: wallet_id.into(),
            hard_currency,
            soft_currency,
        }
    }

    #[inline]
    pub fn balance(&self, currency: CurrencyType) -> i64 {
        match currency {
            CurrencyType::HardCurrency => self.hard_currency,
            CurrencyType::SoftCurrency => self.soft_currency,
        }
    }

    pub fn set_balance(&mut self, currency: CurrencyType, value: i64) {
        match currency {
            CurrencyType::HardCurrency => self.hard_currency = value,
            CurrencyType::SoftCurrency => self.soft_currency = value,
        }
    }
}

/// User joined with its wallet
///
/// `wallet` is `None` only for a user row whose wallet is missing, which the
/// transfer path reports as `UserHasNoWallet`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserWallet {
    #[schema(example = "0f8fad5b-d9cb-469f-a165-70867728950e")]
    pub user_id: String,
    #[schema(example = "Ada")]
    pub firstname: String,
    #[schema(example = "Lovelace")]
    pub lastname: String,
    #[serde(rename = "Wallet")]
    pub wallet: Option<Wallet>,
}

/// A single transfer attempt's parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub currency: CurrencyType,
    pub giver_id: String,
    pub recipient_id: String,
    pub amount: i64,
}

impl TransferRequest {
    pub fn new(
        currency: CurrencyType,
        giver_id: impl Into<String>,
        recipient_id: impl Into<String>,
        amount: i64,
    ) -> Self {
        Self {
            currency,
            giver_id: giver_id.into(),
            recipient_id: recipient_id.into(),
            amount,
        }
    }

    /// Build a request from a raw currency name.
    ///
    /// Fails with `InvalidCurrency` before anything touches the store.
    pub fn parse(
        currency: &str,
        giver_id: impl Into<String>,
        recipient_id: impl Into<String>,
        amount: i64,
    ) -> Result<Self, TransferError> {
        Ok(Self::new(currency.parse()?, giver_id, recipient_id, amount))
    }
}

/// Check the user id shape accepted at the API boundary.
pub fn is_valid_user_id(user_id: &str) -> bool {
    user_id.chars().count() == USER_ID_LEN
}
