//! Database migration command.

use tracing::info;

use super::{CommandError, connect};

/// Run the checkout database migrations.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), CommandError> {
    let store = connect().await?;

    info!("Running checkout migrations...");
    store.migrate().await?;
    info!("Checkout migrations complete!");

    Ok(())
}
