//! Checkout scenarios on the in-memory engine.

use std::sync::Arc;

use cartwright_checkout::models::CheckoutLine;
use cartwright_checkout::{CheckoutError, ErrorKind};
use cartwright_integration_tests::{
    cart_contents, dec, fresh_user, memory_service, qty, reserved, scenarios, stocked_product,
};

#[tokio::test]
async fn test_checkout_succeeds() {
    scenarios::checkout_succeeds(&memory_service()).await;
}

#[tokio::test]
async fn test_insufficient_stock_leaves_cart() {
    scenarios::insufficient_stock_leaves_cart(&memory_service()).await;
}

#[tokio::test]
async fn test_price_mismatch_is_atomic() {
    scenarios::price_mismatch_is_atomic(&memory_service()).await;
}

#[tokio::test]
async fn test_last_unit_race() {
    scenarios::last_unit_race(&memory_service()).await;
}

#[tokio::test]
async fn test_decrement_is_idempotent() {
    scenarios::decrement_is_idempotent(&memory_service()).await;
}

#[tokio::test]
async fn test_cancel_releases_stock() {
    scenarios::cancel_releases_stock(&memory_service()).await;
}

#[tokio::test]
async fn test_failed_reservation_leaves_no_trace() {
    scenarios::failed_reservation_leaves_no_trace(&memory_service()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_decrements_all_count() {
    scenarios::concurrent_decrements_all_count(Arc::new(memory_service()), 8).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_oversell() {
    scenarios::no_oversell(Arc::new(memory_service()), 16).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_invariants_hold() {
    scenarios::invariants_hold(Arc::new(memory_service()), 24).await;
}

#[tokio::test]
async fn test_commit_failure_surfaces_as_transaction_failure() {
    let service = memory_service();
    let product = stocked_product(&service, "5.00", 5).await;
    let user = fresh_user();
    service
        .add_to_cart(user, product, qty(1))
        .await
        .expect("Failed to add to cart");

    service.store().fail_next_commit();
    let err = service
        .checkout(user, &[CheckoutLine::new(product, qty(1))], dec("5.00"))
        .await
        .expect_err("Injected failure should abort checkout");

    assert!(matches!(err, CheckoutError::Transaction(_)));
    assert_eq!(err.kind(), ErrorKind::TransactionFailure);
    assert_eq!(err.status_code(), 503);
    assert!(err.is_retryable());
    assert_eq!(reserved(&service, product).await, 0);
    assert_eq!(cart_contents(&service, user).await, vec![(product, 1)]);
    assert!(service.orders(user).await.expect("orders").is_empty());

    // The client may simply try again.
    service
        .checkout(user, &[CheckoutLine::new(product, qty(1))], dec("5.00"))
        .await
        .expect("Retry should succeed");
    assert_eq!(reserved(&service, product).await, 1);
}

#[tokio::test]
async fn test_conflicts_are_retried_transparently() {
    let service = memory_service();
    let product = stocked_product(&service, "5.00", 5).await;
    let user = fresh_user();

    service.store().conflict_next_commits(2);
    let receipt = service
        .checkout(user, &[CheckoutLine::new(product, qty(2))], dec("10.00"))
        .await
        .expect("Checkout should succeed on the third attempt");

    assert_eq!(reserved(&service, product).await, 2);
    let orders = service.orders(user).await.expect("orders");
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].id, receipt.order_id);
}
