use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    /// PostgreSQL connection URL; the in-memory store is used when absent
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    /// Connection attempts before startup gives up
    pub connect_attempts: u32,
    /// Backoff base; attempt `n` waits `base * 2^n`
    pub connect_base_delay_ms: u64,
    /// Postgres `lock_timeout` applied to every transaction (0 = wait forever)
    pub lock_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout_ms: 5000,
            connect_attempts: 4,
            connect_base_delay_ms: 150,
            lock_timeout_ms: 0,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        (self.lock_timeout_ms > 0).then(|| Duration::from_millis(self.lock_timeout_ms))
    }
}

/// Transfer retry settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransferConfig {
    pub base_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 300,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WalletConfig {
    /// Seed new wallets with a random balance in [0, 2000) per ledger
    pub seed_random: bool,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self { seed_random: true }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "secret".to_string(),
        }
    }
}

impl AppConfig {
    /// Load `config/{env}.yaml`, then apply `DATABASE_URL` / `JWT_SECRET_KEY`
    /// overrides from the environment.
    pub fn load(env: &str) -> Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config yaml: {}", config_path))?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.postgres_url = Some(url);
        }
        if let Ok(secret) = std::env::var("JWT_SECRET_KEY") {
            config.auth.jwt_secret = secret;
        }
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
log_level: info
log_dir: ./logs
log_file: wallet.log
use_json: false
rotation: daily
gateway:
  host: 127.0.0.1
  port: 8080
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.gateway.port, 8080);
        assert!(config.postgres_url.is_none());
        assert_eq!(config.transfer.base_delay_ms, 300);
        assert_eq!(config.transfer.max_attempts, 3);
        assert_eq!(config.database.connect_attempts, 4);
        assert_eq!(config.database.connect_base_delay_ms, 150);
        assert!(config.database.lock_timeout().is_none());
        assert!(config.wallet.seed_random);
    }

    #[test]
    fn test_overrides_sections() {
        let yaml = format!(
            "{}postgres_url: postgres://u:p@localhost/wallets\ntransfer:\n  base_delay_ms: 50\n  max_attempts: 5\ndatabase:\n  max_connections: 4\n  acquire_timeout_ms: 1000\n  connect_attempts: 2\n  connect_base_delay_ms: 10\n  lock_timeout_ms: 250\n",
            MINIMAL
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(
            config.postgres_url.as_deref(),
            Some("postgres://u:p@localhost/wallets")
        );
        assert_eq!(config.transfer.max_attempts, 5);
        assert_eq!(
            config.database.lock_timeout(),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_missing_gateway_is_an_error() {
        assert!(AppConfig::from_yaml("log_level: info").is_err());
    }
}
