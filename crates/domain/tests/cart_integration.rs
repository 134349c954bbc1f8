//! Integration tests for cart reservations.
//!
//! These tests check the stock conservation rule across cart mutations:
//! for every product, ledger quantity plus units held in open and ordered
//! lines always equals the starting stock.

use std::sync::Arc;

use chrono::Utc;
use common::{FulfillmentStatus, Money, OrderId, PaymentStatus, ProductId, UserId};
use domain::{CartService, CatalogService, DomainError, NewProduct};
use storage::{
    CartLine, CommerceStore, InMemoryStore, Order, PAYMENT_METHOD_GATEWAY, PricedOrder, Product,
};

struct Fixture {
    store: InMemoryStore,
    cart: CartService<InMemoryStore>,
    product: Product,
}

async fn fixture(stock: u32) -> Fixture {
    let store = InMemoryStore::new();
    let catalog = CatalogService::new(store.clone());
    let owner = catalog.register_store("Corner Shop").await.unwrap();
    let product = catalog
        .add_product(
            owner.id,
            NewProduct {
                product_name: "Kettle".to_string(),
                description: None,
                price: Money::from_major_units(30),
                max_quantity: stock,
                quantity: None,
                images: vec!["kettle.png".to_string()],
            },
        )
        .await
        .unwrap();

    Fixture {
        cart: CartService::new(store.clone()),
        store,
        product,
    }
}

async fn ledger(store: &InMemoryStore, product_id: ProductId) -> u32 {
    store.get_product(product_id).await.unwrap().unwrap().quantity
}

/// Places an order for a line directly through the store.
async fn order_line(store: &InMemoryStore, line: &CartLine, product: &Product) {
    let order = Order {
        id: OrderId::new(),
        user_id: line.user_id,
        store_id: product.store_id,
        store_name: "Corner Shop".to_string(),
        cart_line_id: line.id,
        address: "4 Mill Lane".to_string(),
        amount: product.price.checked_mul(line.quantity).unwrap(),
        gateway_order_id: "order_test".to_string(),
        gateway_payment_id: None,
        gateway_signature: None,
        payment_method: PAYMENT_METHOD_GATEWAY.to_string(),
        payment_status: PaymentStatus::Pending,
        status: FulfillmentStatus::Pending,
        shipment_id: None,
        return_reason: None,
        return_requested_at: None,
        created_at: Utc::now(),
    };
    store
        .materialize_orders(vec![PricedOrder::new(order, line.quantity)])
        .await
        .unwrap();
}

/// Units held by every line of the product, ordered or open.
async fn held_units(store: &InMemoryStore, users: &[UserId], product_id: ProductId) -> u32 {
    let mut held = 0;
    for user in users {
        for order in store.orders_for_user(*user).await.unwrap() {
            let line = store.get_cart_line(order.cart_line_id).await.unwrap().unwrap();
            if line.product_id == product_id {
                held += line.quantity;
            }
        }
        for line in store.open_cart_lines(*user).await.unwrap() {
            if line.product_id == product_id {
                held += line.quantity;
            }
        }
    }
    held
}

mod reservations {
    use super::*;

    #[tokio::test]
    async fn repeated_adds_build_one_line_until_stock_runs_out() {
        let fx = fixture(4).await;
        let user = UserId::new();

        for _ in 0..4 {
            fx.cart.add_to_cart(user, fx.product.id).await.unwrap();
        }

        let lines = fx.store.open_cart_lines(user).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 4);
        assert_eq!(ledger(&fx.store, fx.product.id).await, 0);

        let result = fx.cart.add_to_cart(user, fx.product.id).await;
        assert!(matches!(result, Err(DomainError::OutOfStock { .. })));
        assert_eq!(ledger(&fx.store, fx.product.id).await, 0);
        assert_eq!(fx.store.open_cart_lines(user).await.unwrap()[0].quantity, 4);
    }

    #[tokio::test]
    async fn remove_then_add_restores_then_reserves() {
        let fx = fixture(5).await;
        let user = UserId::new();

        fx.cart.add_to_cart(user, fx.product.id).await.unwrap();
        let line = fx.cart.add_to_cart(user, fx.product.id).await.unwrap();
        assert_eq!(ledger(&fx.store, fx.product.id).await, 3);

        fx.cart.remove_from_cart(user, line.id).await.unwrap();
        assert_eq!(ledger(&fx.store, fx.product.id).await, 5);

        let fresh = fx.cart.add_to_cart(user, fx.product.id).await.unwrap();
        assert_ne!(fresh.id, line.id);
        assert_eq!(fresh.quantity, 1);
        assert_eq!(ledger(&fx.store, fx.product.id).await, 4);
    }

    #[tokio::test]
    async fn update_scenario_respects_remaining_stock() {
        let fx = fixture(3).await;
        let user = UserId::new();

        fx.cart.add_to_cart(user, fx.product.id).await.unwrap();
        let line = fx.cart.add_to_cart(user, fx.product.id).await.unwrap();
        assert_eq!(line.quantity, 2);
        assert_eq!(ledger(&fx.store, fx.product.id).await, 1);

        let result = fx.cart.update_cart_item(user, line.id, 5).await;
        assert!(matches!(
            result,
            Err(DomainError::InsufficientStock {
                requested: 3,
                available: 1,
                ..
            })
        ));
        assert_eq!(ledger(&fx.store, fx.product.id).await, 1);

        let updated = fx
            .cart
            .update_cart_item(user, line.id, 3)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.quantity, 3);
        assert_eq!(ledger(&fx.store, fx.product.id).await, 0);

        let shrunk = fx
            .cart
            .update_cart_item(user, line.id, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shrunk.quantity, 1);
        assert_eq!(ledger(&fx.store, fx.product.id).await, 2);
    }

    #[tokio::test]
    async fn negative_quantity_deletes_line() {
        let fx = fixture(3).await;
        let user = UserId::new();
        let line = fx.cart.add_to_cart(user, fx.product.id).await.unwrap();

        let result = fx.cart.update_cart_item(user, line.id, -2).await.unwrap();
        assert!(result.is_none());
        assert_eq!(ledger(&fx.store, fx.product.id).await, 3);
        assert!(fx.store.get_cart_line(line.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ordered_lines_are_frozen() {
        let fx = fixture(3).await;
        let user = UserId::new();
        let line = fx.cart.add_to_cart(user, fx.product.id).await.unwrap();
        order_line(&fx.store, &line, &fx.product).await;

        let update = fx.cart.update_cart_item(user, line.id, 2).await;
        assert!(matches!(update, Err(DomainError::NotFound { .. })));
        let remove = fx.cart.remove_from_cart(user, line.id).await;
        assert!(matches!(remove, Err(DomainError::NotFound { .. })));

        // A new add opens a new line instead of growing the ordered one
        let next = fx.cart.add_to_cart(user, fx.product.id).await.unwrap();
        assert_ne!(next.id, line.id);
        let held = held_units(&fx.store, &[user], fx.product.id).await;
        assert_eq!(ledger(&fx.store, fx.product.id).await + held, 3);
    }

    #[tokio::test]
    async fn stock_is_conserved_across_mixed_activity() {
        let fx = fixture(10).await;
        let alice = UserId::new();
        let bob = UserId::new();
        let users = [alice, bob];

        let a = fx.cart.add_to_cart(alice, fx.product.id).await.unwrap();
        fx.cart.add_to_cart(alice, fx.product.id).await.unwrap();
        let b = fx.cart.add_to_cart(bob, fx.product.id).await.unwrap();
        fx.cart.update_cart_item(bob, b.id, 4).await.unwrap();
        fx.cart.update_cart_item(alice, a.id, 1).await.unwrap();

        let bob_line = fx.store.get_cart_line(b.id).await.unwrap().unwrap();
        order_line(&fx.store, &bob_line, &fx.product).await;
        fx.cart.add_to_cart(bob, fx.product.id).await.unwrap();
        fx.cart.remove_from_cart(alice, a.id).await.unwrap();

        let total = ledger(&fx.store, fx.product.id).await
            + held_units(&fx.store, &users, fx.product.id).await;
        assert_eq!(total, 10);
    }
}

mod sync {
    use super::*;

    #[tokio::test]
    async fn sync_skips_present_unknown_and_sold_out() {
        let fx = fixture(2).await;
        let catalog = CatalogService::new(fx.store.clone());
        let sold_out = catalog
            .add_product(
                fx.product.store_id,
                NewProduct {
                    product_name: "Toaster".to_string(),
                    description: None,
                    price: Money::from_major_units(20),
                    max_quantity: 4,
                    quantity: Some(0),
                    images: vec!["toaster.png".to_string()],
                },
            )
            .await
            .unwrap();
        let user = UserId::new();

        fx.cart.add_to_cart(user, fx.product.id).await.unwrap();

        let outcome = fx
            .cart
            .sync_cart(user, vec![fx.product.id, ProductId::new(), sold_out.id])
            .await
            .unwrap();

        assert_eq!(outcome.synced, 0);
        assert_eq!(outcome.cart.items.len(), 1);
        assert_eq!(ledger(&fx.store, fx.product.id).await, 1);
    }

    #[tokio::test]
    async fn resync_does_not_double_reserve() {
        let fx = fixture(5).await;
        let catalog = CatalogService::new(fx.store.clone());
        let second = catalog
            .add_product(
                fx.product.store_id,
                NewProduct {
                    product_name: "Mug".to_string(),
                    description: None,
                    price: Money::from_major_units(5),
                    max_quantity: 5,
                    quantity: Some(2),
                    images: vec!["mug.png".to_string()],
                },
            )
            .await
            .unwrap();
        let user = UserId::new();
        let ids = vec![fx.product.id, second.id, fx.product.id];

        let first = fx.cart.sync_cart(user, ids.clone()).await.unwrap();
        assert_eq!(first.synced, 2);
        assert_eq!(first.cart.cart_total_price, Money::from_major_units(35));

        let again = fx.cart.sync_cart(user, ids).await.unwrap();
        assert_eq!(again.synced, 0);
        assert_eq!(ledger(&fx.store, fx.product.id).await, 4);
        assert_eq!(ledger(&fx.store, second.id).await, 1);
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_never_oversell() {
        let fx = fixture(8).await;
        let cart = Arc::new(fx.cart);
        let user = UserId::new();
        let product_id = fx.product.id;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let cart = Arc::clone(&cart);
            handles.push(tokio::spawn(async move {
                cart.add_to_cart(user, product_id).await
            }));
        }

        let mut succeeded = 0;
        let mut out_of_stock = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(DomainError::OutOfStock { .. }) => out_of_stock += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(succeeded, 8);
        assert_eq!(out_of_stock, 12);
        assert_eq!(ledger(&fx.store, product_id).await, 0);

        let lines = fx.store.open_cart_lines(user).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_users_share_the_ledger() {
        let fx = fixture(5).await;
        let cart = Arc::new(fx.cart);
        let product_id = fx.product.id;
        let users: Vec<UserId> = (0..12).map(|_| UserId::new()).collect();

        let mut handles = Vec::new();
        for user in users.clone() {
            let cart = Arc::clone(&cart);
            handles.push(tokio::spawn(async move {
                cart.add_to_cart(user, product_id).await.is_ok()
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 5);
        assert_eq!(held_units(&fx.store, &users, product_id).await, 5);
        assert_eq!(ledger(&fx.store, product_id).await, 0);
    }
}
