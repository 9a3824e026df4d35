//! Checkout scenarios on `PostgreSQL`.
//!
//! These tests require a database reachable through
//! `CHECKOUT_TEST_DATABASE_URL`; each test returns early when it is unset.
//!
//! ```bash
//! CHECKOUT_TEST_DATABASE_URL=postgres://localhost/cartwright_test \
//!     cargo test -p cartwright-integration-tests --test postgres
//! ```

use std::sync::Arc;

use cartwright_integration_tests::{postgres_service, scenarios};

#[tokio::test]
async fn test_checkout_succeeds() {
    let Some(service) = postgres_service().await else {
        return;
    };
    scenarios::checkout_succeeds(&service).await;
}

#[tokio::test]
async fn test_insufficient_stock_leaves_cart() {
    let Some(service) = postgres_service().await else {
        return;
    };
    scenarios::insufficient_stock_leaves_cart(&service).await;
}

#[tokio::test]
async fn test_price_mismatch_is_atomic() {
    let Some(service) = postgres_service().await else {
        return;
    };
    scenarios::price_mismatch_is_atomic(&service).await;
}

#[tokio::test]
async fn test_last_unit_race() {
    let Some(service) = postgres_service().await else {
        return;
    };
    scenarios::last_unit_race(&service).await;
}

#[tokio::test]
async fn test_decrement_is_idempotent() {
    let Some(service) = postgres_service().await else {
        return;
    };
    scenarios::decrement_is_idempotent(&service).await;
}

#[tokio::test]
async fn test_cancel_releases_stock() {
    let Some(service) = postgres_service().await else {
        return;
    };
    scenarios::cancel_releases_stock(&service).await;
}

#[tokio::test]
async fn test_failed_reservation_leaves_no_trace() {
    let Some(service) = postgres_service().await else {
        return;
    };
    scenarios::failed_reservation_leaves_no_trace(&service).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_decrements_all_count() {
    let Some(service) = postgres_service().await else {
        return;
    };
    scenarios::concurrent_decrements_all_count(Arc::new(service), 8).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_oversell() {
    let Some(service) = postgres_service().await else {
        return;
    };
    scenarios::no_oversell(Arc::new(service), 12).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_invariants_hold() {
    let Some(service) = postgres_service().await else {
        return;
    };
    scenarios::invariants_hold(Arc::new(service), 12).await;
}
