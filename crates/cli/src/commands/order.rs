//! Order inspection and cancellation.

use tracing::info;

use cartwright_checkout::models::OrderDetails;
use cartwright_core::{OrderId, UserId};

use super::{CommandError, service};

fn log_details(details: &OrderDetails) {
    let order = &details.order;
    info!("Order {} for user {}", order.id, order.user_id);
    info!("  Status: {}", order.status);
    info!("  Total: {}", order.total_amount);
    info!("  Placed: {}", order.created_at.to_rfc3339());
    for item in &details.items {
        info!(
            "    - product {} x{} @ {} = {}",
            item.product_id,
            item.quantity.get(),
            item.unit_price,
            item.total_price
        );
    }
}

/// List a user's orders.
///
/// # Errors
///
/// Returns an error if the database is unreachable.
pub async fn list(user_id: UserId) -> Result<(), CommandError> {
    let checkout = service().await?;
    let orders = checkout.orders(user_id).await?;
    if orders.is_empty() {
        info!("User {user_id} has no orders");
        return Ok(());
    }

    info!("Orders for user {user_id}");
    for order in &orders {
        info!(
            "  #{} {} {} ({})",
            order.id,
            order.status,
            order.total_amount,
            order.created_at.to_rfc3339()
        );
    }
    Ok(())
}

/// Show an order with its lines.
///
/// # Errors
///
/// Returns an error if the order does not exist or belongs to someone else.
pub async fn show(user_id: UserId, order_id: i32) -> Result<(), CommandError> {
    let checkout = service().await?;
    let details = checkout.order(user_id, OrderId::new(order_id)).await?;
    log_details(&details);
    Ok(())
}

/// Cancel an order, releasing any stock it holds.
///
/// # Errors
///
/// Returns an error if the order does not exist, belongs to someone else, or
/// is already cancelled or completed.
pub async fn cancel(user_id: UserId, order_id: i32) -> Result<(), CommandError> {
    let checkout = service().await?;
    let order_id = OrderId::new(order_id);
    let order = checkout.cancel_order(user_id, order_id).await?;
    info!("Order {} is now {}", order.id, order.status);

    let details = checkout.order(user_id, order_id).await?;
    log_details(&details);
    Ok(())
}
