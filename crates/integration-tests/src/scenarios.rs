//! Engine-agnostic checkout scenarios.
//!
//! Each function builds its own fixtures and panics on the first broken
//! expectation, so the same body can run against any [`Store`].

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;

use cartwright_checkout::models::CheckoutLine;
use cartwright_checkout::{CheckoutError, Store};
use cartwright_core::{OrderStatus, ProductId, UserId};

use crate::{Service, cart_contents, dec, fresh_user, qty, reserved, set_stock, stocked_product};

/// Cart with 2 x 10.00 and 5 available checks out for 20.00.
pub async fn checkout_succeeds<S: Store>(service: &Service<S>) {
    let product = stocked_product(service, "10.00", 5).await;
    let user = fresh_user();
    service
        .add_to_cart(user, product, qty(2))
        .await
        .expect("Failed to add to cart");

    let receipt = service
        .checkout(user, &[CheckoutLine::new(product, qty(2))], dec("20.00"))
        .await
        .expect("Checkout should succeed");

    assert_eq!(receipt.status, OrderStatus::Processing);
    assert_eq!(receipt.total_amount, dec("20.00"));
    assert_eq!(reserved(service, product).await, 2);
    assert_eq!(service.available(product).await.expect("available"), 3);
    assert!(cart_contents(service, user).await.is_empty());

    let details = service
        .order(user, receipt.order_id)
        .await
        .expect("Order should be readable by its owner");
    assert_eq!(details.order.status, OrderStatus::Processing);
    assert_eq!(details.order.total_amount, dec("20.00"));
    assert_eq!(details.items.len(), 1);
    assert_eq!(details.items[0].product_id, product);
    assert_eq!(details.items[0].unit_price.to_string(), "10.00");
    assert_eq!(details.items[0].total_price, dec("20.00"));
}

/// Same cart with only 1 available fails and changes nothing.
pub async fn insufficient_stock_leaves_cart<S: Store>(service: &Service<S>) {
    let product = stocked_product(service, "10.00", 5).await;
    let user = fresh_user();
    service
        .add_to_cart(user, product, qty(2))
        .await
        .expect("Failed to add to cart");
    set_stock(service, product, 1).await;

    let err = service
        .checkout(user, &[CheckoutLine::new(product, qty(2))], dec("20.00"))
        .await
        .expect_err("Checkout should fail");

    assert!(
        matches!(
            err,
            CheckoutError::InsufficientStock { product_id, available: 1, requested: 2 }
                if product_id == product
        ),
        "unexpected error: {err:?}"
    );
    assert_eq!(err.status_code(), 409);
    assert!(service.orders(user).await.expect("orders").is_empty());
    assert_eq!(reserved(service, product).await, 0);
    assert_eq!(cart_contents(service, user).await, vec![(product, 2)]);
}

/// A client total of 19.00 against 20.00 of live prices is rejected whole.
pub async fn price_mismatch_is_atomic<S: Store>(service: &Service<S>) {
    let product = stocked_product(service, "10.00", 5).await;
    let user = fresh_user();
    service
        .add_to_cart(user, product, qty(2))
        .await
        .expect("Failed to add to cart");

    let err = service
        .checkout(user, &[CheckoutLine::new(product, qty(2))], dec("19.00"))
        .await
        .expect_err("Checkout should fail");

    assert!(
        matches!(
            err,
            CheckoutError::PriceMismatch { calculated, requested }
                if calculated == dec("20.00") && requested == dec("19.00")
        ),
        "unexpected error: {err:?}"
    );
    assert!(service.orders(user).await.expect("orders").is_empty());
    assert_eq!(reserved(service, product).await, 0);
    assert_eq!(cart_contents(service, user).await, vec![(product, 2)]);
}

/// Two shoppers race for the last unit; exactly one wins.
pub async fn last_unit_race<S: Store>(service: &Service<S>) {
    let product = stocked_product(service, "4.00", 1).await;
    let (alice, bob) = (fresh_user(), fresh_user());
    let line = [CheckoutLine::new(product, qty(1))];

    let (first, second) = tokio::join!(
        service.checkout(alice, &line, dec("4.00")),
        service.checkout(bob, &line, dec("4.00")),
    );

    let outcomes = [first, second];
    let winners = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(winners, 1, "outcomes: {outcomes:?}");
    for outcome in &outcomes {
        if let Err(err) = outcome {
            assert!(
                matches!(err, CheckoutError::InsufficientStock { available: 0, requested: 1, .. }),
                "unexpected error: {err:?}"
            );
        }
    }
    assert_eq!(reserved(service, product).await, 1);
}

/// Decrementing to zero removes the line; decrementing nothing returns 0.
pub async fn decrement_is_idempotent<S: Store>(service: &Service<S>) {
    let product = stocked_product(service, "1.50", 10).await;
    let user = fresh_user();

    assert_eq!(
        service.decrement_cart_item(user, product).await.expect("decrement"),
        0
    );

    service
        .add_to_cart(user, product, qty(2))
        .await
        .expect("Failed to add to cart");
    assert_eq!(
        service.decrement_cart_item(user, product).await.expect("decrement"),
        1
    );
    assert_eq!(
        service.decrement_cart_item(user, product).await.expect("decrement"),
        0
    );
    assert!(cart_contents(service, user).await.is_empty());
    assert_eq!(
        service.decrement_cart_item(user, product).await.expect("decrement"),
        0
    );

    let err = service
        .remove_cart_item(user, product)
        .await
        .expect_err("Removing an absent line should fail");
    assert!(matches!(err, CheckoutError::CartItemNotFound(p) if p == product));
}

/// A reservation failing after the order rows, cart clear and status change
/// were written leaves none of them behind.
pub async fn failed_reservation_leaves_no_trace<S: Store>(service: &Service<S>) {
    let product = stocked_product(service, "1.00", 3).await;
    let user = fresh_user();
    service
        .add_to_cart(user, product, qty(2))
        .await
        .expect("Failed to add to cart");

    // Each line passes the advisory check alone; together they need 4 of 3.
    let lines = [
        CheckoutLine::new(product, qty(2)),
        CheckoutLine::new(product, qty(2)),
    ];
    let err = service
        .checkout(user, &lines, dec("4.00"))
        .await
        .expect_err("Checkout should fail");

    assert!(
        matches!(
            err,
            CheckoutError::InsufficientStock { product_id, available: 1, requested: 2 }
                if product_id == product
        ),
        "unexpected error: {err:?}"
    );
    assert!(service.orders(user).await.expect("orders").is_empty());
    assert_eq!(reserved(service, product).await, 0);
    assert_eq!(service.available(product).await.expect("available"), 3);
    assert_eq!(cart_contents(service, user).await, vec![(product, 2)]);
}

/// `decrements` concurrent single-unit decrements of one line each count.
///
/// A decrement may give up under contention with a retryable error; every
/// one that succeeds must be reflected in the final quantity.
pub async fn concurrent_decrements_all_count<S: Store>(
    service: Arc<Service<S>>,
    decrements: i32,
) {
    const START: i32 = 10;
    assert!(decrements < START);
    let product = stocked_product(&service, "1.00", START).await;
    let user = fresh_user();
    service
        .add_to_cart(user, product, qty(START))
        .await
        .expect("Failed to add to cart");

    let mut handles = Vec::new();
    for _ in 0..decrements {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service.decrement_cart_item(user, product).await
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        match handle.await.expect("decrement task panicked") {
            Ok(remaining) => {
                assert!(seen.insert(remaining), "two decrements both left {remaining}");
            }
            Err(err) => assert!(err.is_retryable(), "unexpected error: {err:?}"),
        }
    }

    let applied = i32::try_from(seen.len()).expect("small count");
    assert!(applied >= 1);
    assert_eq!(
        cart_contents(&service, user).await,
        vec![(product, START - applied)]
    );
}

/// Cancelling returns the reservation and is final.
pub async fn cancel_releases_stock<S: Store>(service: &Service<S>) {
    let product = stocked_product(service, "3.00", 4).await;
    let user = fresh_user();

    let receipt = service
        .checkout(user, &[CheckoutLine::new(product, qty(3))], dec("9.00"))
        .await
        .expect("Checkout should succeed");
    assert_eq!(reserved(service, product).await, 3);

    let stranger = fresh_user();
    let err = service
        .cancel_order(stranger, receipt.order_id)
        .await
        .expect_err("Only the owner may cancel");
    assert!(matches!(err, CheckoutError::OrderNotFound(_)));

    let order = service
        .cancel_order(user, receipt.order_id)
        .await
        .expect("Cancel should succeed");
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(reserved(service, product).await, 0);
    assert_eq!(service.available(product).await.expect("available"), 4);

    let err = service
        .cancel_order(user, receipt.order_id)
        .await
        .expect_err("Cancelling twice should fail");
    assert!(matches!(
        err,
        CheckoutError::InvalidTransition {
            from: OrderStatus::Cancelled,
            to: OrderStatus::Cancelled
        }
    ));
}

/// `contenders` checkouts each ask for the whole stock at once.
///
/// Exactly one may succeed; everyone else must be told the stock is gone.
pub async fn no_oversell<S: Store>(service: Arc<Service<S>>, contenders: usize) {
    const STOCK: i32 = 3;
    let product = stocked_product(&service, "2.00", STOCK).await;

    let mut handles = Vec::with_capacity(contenders);
    for _ in 0..contenders {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service
                .checkout(
                    fresh_user(),
                    &[CheckoutLine::new(product, qty(STOCK))],
                    dec("6.00"),
                )
                .await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.expect("checkout task panicked") {
            Ok(_) => winners += 1,
            Err(CheckoutError::InsufficientStock { .. }) => {}
            Err(err) => panic!("unexpected error: {err:?}"),
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(reserved(&service, product).await, STOCK);
}

/// Concurrent carts, checkouts and cancellations keep the stock books
/// consistent.
///
/// Afterwards every product has `0 <= reserved <= quantity`, its reserved
/// count equals the units held by `processing` orders, and no cart holds a
/// product twice.
pub async fn invariants_hold<S: Store>(service: Arc<Service<S>>, shoppers: usize) {
    let products = [
        stocked_product(&service, "1.00", 4).await,
        stocked_product(&service, "2.50", 2).await,
        stocked_product(&service, "0.99", 7).await,
    ];
    let users: Vec<UserId> = (0..shoppers).map(|_| fresh_user()).collect();

    let mut handles = Vec::with_capacity(shoppers);
    for (index, &user) in users.iter().enumerate() {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            let product = products[index % products.len()];
            let other = products[(index + 1) % products.len()];

            // Cart changes are advisory; losing a race here is expected.
            for target in [product, other, product] {
                let _ = service.add_to_cart(user, target, qty(1)).await;
            }
            if index % 3 == 0 {
                let _ = service.decrement_cart_item(user, other).await;
            }

            let cart = service.list_cart(user).await.expect("Failed to list cart");
            if cart.is_empty() {
                return;
            }
            let lines: Vec<CheckoutLine> = cart
                .iter()
                .map(|line| CheckoutLine::new(line.product.id, line.item.quantity))
                .collect();
            let total: Decimal = cart
                .iter()
                .map(|line| line.display_total().expect("line total in range"))
                .sum();

            match service.checkout(user, &lines, total).await {
                Ok(receipt) if index % 2 == 0 => {
                    // Retries exhausted under contention is an acceptable outcome.
                    if let Err(err) = service.cancel_order(user, receipt.order_id).await {
                        assert!(err.is_retryable(), "unexpected error: {err:?}");
                    }
                }
                Ok(_) | Err(CheckoutError::InsufficientStock { .. }) => {}
                Err(err) => assert!(err.is_retryable(), "unexpected error: {err:?}"),
            }
        }));
    }
    for handle in handles {
        handle.await.expect("shopper task panicked");
    }

    for product in products {
        let held = held_by_processing_orders(&service, &users, product).await;
        let check = service
            .check_stock(product, qty(1))
            .await
            .expect("Failed to check stock");
        assert!(check.reserved >= 0, "{check:?}");
        assert!(check.reserved <= check.total, "{check:?}");
        assert_eq!(check.reserved, held, "{check:?}");
    }

    for &user in &users {
        let contents = cart_contents(&service, user).await;
        let distinct: HashSet<ProductId> = contents.iter().map(|(id, _)| *id).collect();
        assert_eq!(distinct.len(), contents.len(), "duplicate cart line: {contents:?}");
    }
}

async fn held_by_processing_orders<S: Store>(
    service: &Service<S>,
    users: &[UserId],
    product: ProductId,
) -> i32 {
    let mut held = 0;
    for &user in users {
        for order in service.orders(user).await.expect("Failed to list orders") {
            if !order.status.holds_reservation() {
                continue;
            }
            let details = service
                .order(user, order.id)
                .await
                .expect("Failed to read order");
            held += details
                .items
                .iter()
                .filter(|item| item.product_id == product)
                .map(|item| item.quantity.get())
                .sum::<i32>();
        }
    }
    held
}
