//! Stock inspection and adjustment.

use rust_decimal::Decimal;
use tracing::{info, warn};

use cartwright_checkout::CheckoutError;
use cartwright_checkout::models::StockLevels;
use cartwright_core::{ProductId, Quantity};

use super::{CommandError, service};

/// Assemble operator-supplied stock levels.
///
/// A missing `max` becomes the larger of `quantity` and `min`.
#[must_use]
pub fn levels(
    quantity: i32,
    min: i32,
    max: Option<i32>,
    cost_price: Option<Decimal>,
) -> StockLevels {
    StockLevels {
        quantity,
        min_stock_level: min,
        max_stock_level: max.unwrap_or(quantity.max(min)),
        cost_price,
    }
}

/// Report a product's stock against a requested amount.
///
/// # Errors
///
/// Returns an error if the quantity is not positive or the product is
/// unknown or inactive.
pub async fn check(product_id: i32, quantity: i32) -> Result<(), CommandError> {
    let requested = Quantity::new(quantity).map_err(CheckoutError::from)?;
    let checkout = service().await?;
    let product_id = ProductId::new(product_id);

    let check = checkout.check_stock(product_id, requested).await?;
    info!("Stock for product {product_id}");
    info!("  Status: {:?}", check.status);
    info!("  On hand: {}", check.total);
    info!("  Reserved: {}", check.reserved);
    info!("  Available: {}", check.available);
    if check.sufficient {
        info!("  {} units can be reserved", check.requested);
    } else {
        warn!("  Insufficient for {} units", check.requested);
    }

    Ok(())
}

/// Overwrite a product's stock counters.
///
/// # Errors
///
/// Returns an error if the levels are invalid or the product does not exist.
pub async fn set(product_id: i32, levels: StockLevels) -> Result<(), CommandError> {
    let checkout = service().await?;
    let inventory = checkout
        .stock_product(ProductId::new(product_id), levels)
        .await?;

    info!("Stock updated for product {}", inventory.product_id);
    info!("  On hand: {}", inventory.quantity);
    info!("  Reserved: {}", inventory.reserved_quantity);
    info!(
        "  Levels: min {} / max {}",
        inventory.min_stock_level, inventory.max_stock_level
    );

    Ok(())
}

/// Count active products at or below their low-water mark.
///
/// # Errors
///
/// Returns an error if the database is unreachable.
pub async fn low() -> Result<(), CommandError> {
    let checkout = service().await?;
    let count = checkout.low_stock_count().await?;
    if count > 0 {
        warn!("{count} active products are running low");
    } else {
        info!("No products are running low");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_default_max() {
        assert_eq!(levels(10, 2, None, None).max_stock_level, 10);
        assert_eq!(levels(1, 5, None, None).max_stock_level, 5);
        assert_eq!(levels(1, 5, Some(40), None).max_stock_level, 40);
    }
}
