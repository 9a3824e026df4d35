//! Checkout configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CHECKOUT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `CHECKOUT_DB_MAX_CONNECTIONS` - Pool size (default: 25)
//! - `CHECKOUT_DB_MIN_CONNECTIONS` - Idle connections kept open (default: 5)
//! - `CHECKOUT_DB_ACQUIRE_TIMEOUT_SECS` - Pool acquire timeout (default: 10)
//! - `CHECKOUT_DB_MAX_LIFETIME_SECS` - Connection max lifetime (default: 300)
//! - `CHECKOUT_TX_MAX_ATTEMPTS` - Attempts per operation on serialization conflicts (default: 3)
//! - `CHECKOUT_PRICE_LOOKUP_TIMEOUT_MS` - Per-product price lookup timeout (default: 2000)

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_MIN_CONNECTIONS: u32 = 5;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_LIFETIME_SECS: u64 = 300;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_PRICE_LOOKUP_TIMEOUT_MS: u64 = 2000;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Checkout service configuration.
///
/// Implements `Debug` manually so the database URL (which carries the
/// password) never reaches logs.
#[derive(Clone)]
pub struct CheckoutConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// Connection pool settings
    pub pool: PoolConfig,
    /// Transaction retry and timeout settings
    pub transactions: TransactionSettings,
}

impl std::fmt::Debug for CheckoutConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutConfig")
            .field("database_url", &"[REDACTED]")
            .field("pool", &self.pool)
            .field("transactions", &self.transactions)
            .finish()
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum open connections
    pub max_connections: u32,
    /// Idle connections kept open
    pub min_connections: u32,
    /// How long to wait for a free connection
    pub acquire_timeout: Duration,
    /// Connections older than this are recycled
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            max_lifetime: Duration::from_secs(DEFAULT_MAX_LIFETIME_SECS),
        }
    }
}

/// How operations behave under contention and slow collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionSettings {
    /// Total attempts for one operation when the store reports a retryable
    /// conflict. Always at least 1.
    pub max_attempts: u32,
    /// Upper bound on each price lookup made before checkout.
    pub price_lookup_timeout: Duration,
}

impl Default for TransactionSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            price_lookup_timeout: Duration::from_millis(DEFAULT_PRICE_LOOKUP_TIMEOUT_MS),
        }
    }
}

impl CheckoutConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = get_database_url(&lookup, "CHECKOUT_DATABASE_URL")?;

        let pool = PoolConfig {
            max_connections: get_parsed_or_default(
                &lookup,
                "CHECKOUT_DB_MAX_CONNECTIONS",
                DEFAULT_MAX_CONNECTIONS,
            )?,
            min_connections: get_parsed_or_default(
                &lookup,
                "CHECKOUT_DB_MIN_CONNECTIONS",
                DEFAULT_MIN_CONNECTIONS,
            )?,
            acquire_timeout: Duration::from_secs(get_parsed_or_default(
                &lookup,
                "CHECKOUT_DB_ACQUIRE_TIMEOUT_SECS",
                DEFAULT_ACQUIRE_TIMEOUT_SECS,
            )?),
            max_lifetime: Duration::from_secs(get_parsed_or_default(
                &lookup,
                "CHECKOUT_DB_MAX_LIFETIME_SECS",
                DEFAULT_MAX_LIFETIME_SECS,
            )?),
        };
        if pool.min_connections > pool.max_connections {
            return Err(ConfigError::InvalidEnvVar(
                "CHECKOUT_DB_MIN_CONNECTIONS".to_string(),
                format!(
                    "must not exceed CHECKOUT_DB_MAX_CONNECTIONS ({})",
                    pool.max_connections
                ),
            ));
        }

        let max_attempts =
            get_parsed_or_default(&lookup, "CHECKOUT_TX_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "CHECKOUT_TX_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let timeout_ms = get_parsed_or_default(
            &lookup,
            "CHECKOUT_PRICE_LOOKUP_TIMEOUT_MS",
            DEFAULT_PRICE_LOOKUP_TIMEOUT_MS,
        )?;
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "CHECKOUT_PRICE_LOOKUP_TIMEOUT_MS".to_string(),
                "must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            database_url,
            pool,
            transactions: TransactionSettings {
                max_attempts,
                price_lookup_timeout: Duration::from_millis(timeout_ms),
            },
        })
    }
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url<F>(lookup: &F, primary_key: &str) -> Result<SecretString, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(primary_key)
        .or_else(|| lookup("DATABASE_URL"))
        .map(SecretString::from)
        .ok_or_else(|| ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Parse an optional variable, falling back to `default` when unset.
fn get_parsed_or_default<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<CheckoutConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        CheckoutConfig::from_source(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("CHECKOUT_DATABASE_URL", "postgres://localhost/checkout")]).unwrap();
        assert_eq!(config.pool, PoolConfig::default());
        assert_eq!(config.transactions, TransactionSettings::default());
        assert_eq!(config.pool.max_connections, 25);
        assert_eq!(config.transactions.max_attempts, 3);
        assert_eq!(
            config.transactions.price_lookup_timeout,
            Duration::from_millis(2000)
        );
    }

    #[test]
    fn test_database_url_fallback() {
        let config = load(&[("DATABASE_URL", "postgres://fallback/db")]).unwrap();
        assert_eq!(config.database_url.expose_secret(), "postgres://fallback/db");

        let config = load(&[
            ("CHECKOUT_DATABASE_URL", "postgres://primary/db"),
            ("DATABASE_URL", "postgres://fallback/db"),
        ])
        .unwrap();
        assert_eq!(config.database_url.expose_secret(), "postgres://primary/db");
    }

    #[test]
    fn test_missing_database_url() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "CHECKOUT_DATABASE_URL"));
    }

    #[test]
    fn test_invalid_number() {
        let err = load(&[
            ("CHECKOUT_DATABASE_URL", "postgres://localhost/checkout"),
            ("CHECKOUT_DB_MAX_CONNECTIONS", "many"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(key, _) if key == "CHECKOUT_DB_MAX_CONNECTIONS"));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = load(&[
            ("CHECKOUT_DATABASE_URL", "postgres://localhost/checkout"),
            ("CHECKOUT_TX_MAX_ATTEMPTS", "0"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(key, _) if key == "CHECKOUT_TX_MAX_ATTEMPTS"));
    }

    #[test]
    fn test_zero_price_timeout_rejected() {
        let err = load(&[
            ("CHECKOUT_DATABASE_URL", "postgres://localhost/checkout"),
            ("CHECKOUT_PRICE_LOOKUP_TIMEOUT_MS", "0"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(..)));
    }

    #[test]
    fn test_min_above_max_rejected() {
        let err = load(&[
            ("CHECKOUT_DATABASE_URL", "postgres://localhost/checkout"),
            ("CHECKOUT_DB_MAX_CONNECTIONS", "2"),
            ("CHECKOUT_DB_MIN_CONNECTIONS", "4"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(key, _) if key == "CHECKOUT_DB_MIN_CONNECTIONS"));
    }

    #[test]
    fn test_debug_redacts_url() {
        let config = load(&[("CHECKOUT_DATABASE_URL", "postgres://user:hunter2@db/checkout")])
            .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }
}
