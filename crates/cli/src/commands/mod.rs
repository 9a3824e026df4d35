//! CLI subcommands.
//!
//! Each command builds its own connection from the environment, so
//! `migrate` can run before anything else is configured.

use thiserror::Error;
use tracing::info;

use cartwright_checkout::{
    CatalogPriceOracle, CheckoutConfig, CheckoutError, CheckoutService, ConfigError, PgStore,
    StoreError, TransactionSettings,
};

pub mod migrate;
pub mod order;
pub mod seed;
pub mod stock;

/// Checkout service backed by `PostgreSQL`.
pub type Service = CheckoutService<PgStore, CatalogPriceOracle<PgStore>>;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Environment configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Could not connect to the database.
    #[error("database error: {0}")]
    Store(#[from] StoreError),

    /// Migrations failed.
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// A checkout operation failed.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    /// Could not read an input file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Input file is not valid YAML for this command.
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Input was parsed but failed validation.
    #[error("{0}")]
    Invalid(String),
}

async fn open() -> Result<(PgStore, TransactionSettings), CommandError> {
    let config = CheckoutConfig::from_env()?;
    let store = PgStore::connect(&config.pool, &config.database_url).await?;
    info!(
        max_connections = config.pool.max_connections,
        "Connected to database"
    );
    Ok((store, config.transactions))
}

/// Connect to the checkout database described by the environment.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the pool cannot connect.
pub async fn connect() -> Result<PgStore, CommandError> {
    let (store, _) = open().await?;
    Ok(store)
}

/// Build the checkout service over a fresh connection.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the pool cannot connect.
pub async fn service() -> Result<Service, CommandError> {
    let (store, settings) = open().await?;
    Ok(CheckoutService::new(store, settings))
}
