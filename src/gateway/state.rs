use std::sync::Arc;

use crate::wallet::WalletService;

/// Shared gateway state
#[derive(Clone)]
pub struct AppState {
    pub wallet: Arc<WalletService>,
    /// HS256 secret for bearer token verification
    pub jwt_secret: Arc<str>,
}

impl AppState {
    pub fn new(wallet: Arc<WalletService>, jwt_secret: impl Into<Arc<str>>) -> Self {
        Self {
            wallet,
            jwt_secret: jwt_secret.into(),
        }
    }
}
