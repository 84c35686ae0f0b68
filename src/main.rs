//! Wallet Service entry point
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌───────────────┐    ┌──────────────┐
//! │  Config  │───▶│ Gateway  │───▶│ WalletService │───▶│ WalletStore  │
//! │  (YAML)  │    │  (axum)  │    │ (retry/exec)  │    │ (PG or mem)  │
//! └──────────┘    └──────────┘    └───────────────┘    └──────────────┘
//! ```
//!
//! Usage: `wallet_service [--env dev] [--port 8080]`

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use wallet_service::config::AppConfig;
use wallet_service::db::Database;
use wallet_service::gateway::{self, state::AppState};
use wallet_service::logging::init_logging;
use wallet_service::wallet::{
    InMemoryWalletStore, PgWalletStore, RetryPolicy, WalletService, WalletStore,
};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string())
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _log_guard = init_logging(&config);

    info!(
        env = %env,
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_HASH"),
        "Starting Wallet Service"
    );

    let (store, db): (Arc<dyn WalletStore>, Option<Arc<Database>>) = match &config.postgres_url {
        Some(url) => {
            let db = Arc::new(
                Database::connect_with_retry(url, &config.database)
                    .await
                    .context("Failed to establish database connection")?,
            );
            let store =
                PgWalletStore::new(db.clone()).with_lock_timeout(config.database.lock_timeout());
            store
                .ensure_schema()
                .await
                .context("Failed to create wallet schema")?;
            (Arc::new(store), Some(db))
        }
        None => {
            warn!("No postgres_url configured, using the in-memory wallet store");
            let store = InMemoryWalletStore::with_lock_timeout(config.database.lock_timeout());
            (Arc::new(store), None)
        }
    };

    let policy = RetryPolicy::from(&config.transfer);
    info!(
        store = store.name(),
        base_delay_ms = policy.base_delay.as_millis() as u64,
        max_attempts = policy.max_attempts,
        "Wallet service ready"
    );
    let wallet = Arc::new(WalletService::new(store, policy, config.wallet.seed_random));
    let state = Arc::new(AppState::new(wallet, config.auth.jwt_secret.as_str()));

    let port = get_port_override().unwrap_or(config.gateway.port);
    let served = gateway::run_server(&config.gateway.host, port, state, shutdown_signal()).await;

    if let Some(db) = db {
        db.close().await;
    }
    served.with_context(|| format!("Gateway failed on {}:{}", config.gateway.host, port))?;

    info!("Wallet Service stopped");
    Ok(())
}
