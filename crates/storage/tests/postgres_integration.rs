//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p storage --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{
    FulfillmentStatus, Money, OrderId, PaymentStatus, ProductId, ShipmentId, StoreId, UserId,
};
use serial_test::serial;
use sqlx::PgPool;
use storage::{
    CartChange, CartLine, CommerceStore, FulfillmentTransition, Like, Order,
    PAYMENT_METHOD_GATEWAY, PostgresStore, PricedOrder, Product, ProductFilter, ProductUpdate,
    ReturnRequest, Settlement, Shipment, ShipmentStatus, StorageError, StoreRecord,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            for migration in [
                include_str!("../../../migrations/001_create_commerce_tables.sql"),
                include_str!("../../../migrations/002_create_likes.sql"),
            ] {
                sqlx::raw_sql(migration).execute(&temp_pool).await.unwrap();
            }
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE likes, shipments, orders, cart_lines, products, stores")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

async fn seed_product(store: &PostgresStore, quantity: u32) -> Product {
    let owner = store
        .insert_store(StoreRecord::new("Kettle & Co"))
        .await
        .unwrap();
    store
        .insert_product(Product {
            id: ProductId::new(),
            store_id: owner.id,
            product_name: "Teapot".to_string(),
            description: Some("Cast iron".to_string()),
            price: Money::from_minor(25_000),
            max_quantity: quantity,
            quantity,
            images: vec!["uploads/teapot.png".to_string()],
            is_available: true,
            created_at: Utc::now(),
        })
        .await
        .unwrap()
}

fn order_for(line: &CartLine, product: &Product, gateway_order_id: &str) -> Order {
    Order {
        id: OrderId::new(),
        user_id: line.user_id,
        store_id: product.store_id,
        store_name: "Kettle & Co".to_string(),
        cart_line_id: line.id,
        address: "12 Tea Street".to_string(),
        amount: product.price.checked_mul(line.quantity).unwrap(),
        gateway_order_id: gateway_order_id.to_string(),
        gateway_payment_id: None,
        gateway_signature: None,
        payment_method: PAYMENT_METHOD_GATEWAY.to_string(),
        payment_status: PaymentStatus::Pending,
        status: FulfillmentStatus::Pending,
        shipment_id: None,
        return_reason: None,
        return_requested_at: None,
        created_at: Utc::now(),
    }
}

fn priced(order: Order, line: &CartLine) -> PricedOrder {
    PricedOrder::new(order, line.quantity)
}

async fn open_line(store: &PostgresStore, user: UserId, product: &Product, qty: u32) -> CartLine {
    store
        .apply_cart_change(CartChange::insert(CartLine::open(user, product.id, qty)))
        .await
        .unwrap()
        .line
        .unwrap()
}

#[tokio::test]
#[serial]
async fn product_roundtrip() {
    let store = get_test_store().await;
    let product = seed_product(&store, 3).await;

    let loaded = store.get_product(product.id).await.unwrap().unwrap();
    assert_eq!(loaded.product_name, "Teapot");
    assert_eq!(loaded.price, Money::from_minor(25_000));
    assert_eq!(loaded.images, vec!["uploads/teapot.png".to_string()]);
}

#[tokio::test]
#[serial]
async fn conditional_reserve() {
    let store = get_test_store().await;
    let product = seed_product(&store, 2).await;

    assert_eq!(store.reserve_stock(product.id, 2).await.unwrap(), 0);

    let result = store.reserve_stock(product.id, 1).await;
    assert!(matches!(
        result,
        Err(StorageError::InsufficientStock { available: 0, .. })
    ));

    let missing = store.reserve_stock(ProductId::new(), 1).await;
    assert!(matches!(missing, Err(StorageError::NotFound { .. })));
}

#[tokio::test]
#[serial]
async fn one_open_line_enforced_by_index() {
    let store = get_test_store().await;
    let product = seed_product(&store, 5).await;
    let user = UserId::new();

    open_line(&store, user, &product, 1).await;
    let result = store
        .apply_cart_change(CartChange::insert(CartLine::open(user, product.id, 1)))
        .await;
    assert!(matches!(result, Err(StorageError::Conflict(_))));

    // The failed insert rolled back its reservation
    let product = store.get_product(product.id).await.unwrap().unwrap();
    assert_eq!(product.quantity, 4);
}

#[tokio::test]
#[serial]
async fn insufficient_resize_rolls_back_line() {
    let store = get_test_store().await;
    let product = seed_product(&store, 3).await;
    let user = UserId::new();

    let line = open_line(&store, user, &product, 2).await;
    let result = store.apply_cart_change(CartChange::resize(&line, 5)).await;
    assert!(matches!(
        result,
        Err(StorageError::InsufficientStock { .. })
    ));

    let line = store.get_cart_line(line.id).await.unwrap().unwrap();
    assert_eq!(line.quantity, 2);

    let resized = store
        .apply_cart_change(CartChange::resize(&line, 3))
        .await
        .unwrap();
    assert_eq!(resized.remaining_stock, Some(0));
}

#[tokio::test]
#[serial]
async fn concurrent_reservations_never_oversell() {
    let store = get_test_store().await;
    let product = seed_product(&store, 10).await;
    let product_id = product.id;

    let mut handles = Vec::new();
    for _ in 0..25 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.reserve_stock(product_id, 1).await.is_ok()
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 10);
    let product = store.get_product(product.id).await.unwrap().unwrap();
    assert_eq!(product.quantity, 0);
}

#[tokio::test]
#[serial]
async fn materialize_is_all_or_nothing() {
    let store = get_test_store().await;
    let product = seed_product(&store, 5).await;
    let other = seed_product(&store, 5).await;
    let user = UserId::new();

    let first = open_line(&store, user, &product, 1).await;
    store
        .materialize_orders(vec![priced(order_for(&first, &product, "order_a"), &first)])
        .await
        .unwrap();

    let second = open_line(&store, user, &other, 1).await;
    let result = store
        .materialize_orders(vec![
            priced(order_for(&second, &other, "order_b"), &second),
            priced(order_for(&first, &product, "order_b"), &first),
        ])
        .await;
    assert!(matches!(result, Err(StorageError::Conflict(_))));

    assert!(store.orders_for_transaction("order_b").await.unwrap().is_empty());
    let open = store.open_cart_lines(user).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, second.id);
}

#[tokio::test]
#[serial]
async fn settlement_respects_payment_graph() {
    let store = get_test_store().await;
    let product = seed_product(&store, 5).await;
    let user = UserId::new();

    let line = open_line(&store, user, &product, 2).await;
    store
        .materialize_orders(vec![priced(order_for(&line, &product, "order_pay"), &line)])
        .await
        .unwrap();

    let failed = store
        .settle_transaction(Settlement {
            gateway_order_id: "order_pay".to_string(),
            user_id: user,
            status: PaymentStatus::Failed,
            payment_id: None,
            signature: None,
        })
        .await
        .unwrap();
    assert_eq!(failed, 1);

    let completed = store
        .settle_transaction(Settlement {
            gateway_order_id: "order_pay".to_string(),
            user_id: user,
            status: PaymentStatus::Completed,
            payment_id: Some("pay_1".to_string()),
            signature: Some("abc".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(completed, 1);

    let orders = store.orders_for_transaction("order_pay").await.unwrap();
    assert_eq!(orders[0].payment_status, PaymentStatus::Completed);
    assert_eq!(orders[0].gateway_signature.as_deref(), Some("abc"));

    let foreign = store
        .settle_transaction(Settlement {
            gateway_order_id: "order_pay".to_string(),
            user_id: UserId::new(),
            status: PaymentStatus::Completed,
            payment_id: Some("pay_2".to_string()),
            signature: None,
        })
        .await
        .unwrap();
    assert_eq!(foreign, 0);
}

#[tokio::test]
#[serial]
async fn materialize_rejects_resized_line() {
    let store = get_test_store().await;
    let product = seed_product(&store, 6).await;
    let user = UserId::new();

    let line = open_line(&store, user, &product, 1).await;
    let order = order_for(&line, &product, "order_stale");
    store
        .apply_cart_change(CartChange::resize(&line, 4))
        .await
        .unwrap();

    let result = store.materialize_orders(vec![priced(order, &line)]).await;
    assert!(matches!(result, Err(StorageError::Conflict(_))));
    assert!(store.orders_for_transaction("order_stale").await.unwrap().is_empty());

    let open = store.open_cart_lines(user).await.unwrap();
    assert_eq!(open[0].quantity, 4);
    assert!(!open[0].ordered);
}

#[tokio::test]
#[serial]
async fn fulfillment_compare_and_set() {
    let store = get_test_store().await;
    let product = seed_product(&store, 5).await;
    let user = UserId::new();

    let line = open_line(&store, user, &product, 1).await;
    let mut order = order_for(&line, &product, "order_ship");
    order.status = FulfillmentStatus::Delivered;
    store
        .materialize_orders(vec![priced(order.clone(), &line)])
        .await
        .unwrap();

    let stale = store
        .transition_fulfillment(FulfillmentTransition {
            order_id: order.id,
            expected: FulfillmentStatus::Pending,
            next: FulfillmentStatus::Approved,
            return_request: None,
        })
        .await;
    assert!(matches!(stale, Err(StorageError::Conflict(_))));

    let returned = store
        .transition_fulfillment(FulfillmentTransition {
            order_id: order.id,
            expected: FulfillmentStatus::Delivered,
            next: FulfillmentStatus::ReturnInitiated,
            return_request: Some(ReturnRequest {
                reason: "Chipped spout".to_string(),
                requested_at: Utc::now(),
            }),
        })
        .await
        .unwrap();
    assert_eq!(returned.status, FulfillmentStatus::ReturnInitiated);
    assert_eq!(returned.return_reason.as_deref(), Some("Chipped spout"));

    let missing = store
        .transition_fulfillment(FulfillmentTransition {
            order_id: OrderId::new(),
            expected: FulfillmentStatus::Pending,
            next: FulfillmentStatus::Approved,
            return_request: None,
        })
        .await;
    assert!(matches!(missing, Err(StorageError::NotFound { .. })));
}

#[tokio::test]
#[serial]
async fn shipment_unique_per_order() {
    let store = get_test_store().await;
    let product = seed_product(&store, 5).await;
    let user = UserId::new();

    let line = open_line(&store, user, &product, 1).await;
    let mut order = order_for(&line, &product, "order_trk");
    order.status = FulfillmentStatus::Approved;
    store
        .materialize_orders(vec![priced(order.clone(), &line)])
        .await
        .unwrap();

    let shipment = Shipment {
        id: ShipmentId::new(),
        order_id: order.id,
        courier: "MockCourier".to_string(),
        tracking_number: "TRK123456".to_string(),
        status: ShipmentStatus::Shipped,
        estimated_delivery: Utc::now() + Duration::days(5),
        created_at: Utc::now(),
    };
    let shipped = store
        .create_shipment(shipment.clone(), FulfillmentStatus::Approved)
        .await
        .unwrap();
    assert_eq!(shipped.status, FulfillmentStatus::Shipped);

    let again = store
        .create_shipment(
            Shipment {
                id: ShipmentId::new(),
                ..shipment.clone()
            },
            FulfillmentStatus::Approved,
        )
        .await;
    assert!(matches!(again, Err(StorageError::AlreadyExists { .. })));

    let loaded = store.shipment_for_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.tracking_number, "TRK123456");
}

#[tokio::test]
#[serial]
async fn public_listing_filters_and_counts() {
    let store = get_test_store().await;
    let product = seed_product(&store, 1).await;
    seed_product(&store, 1).await;
    store
        .toggle_product_availability(product.store_id, product.id)
        .await
        .unwrap();

    let page = store
        .list_products(ProductFilter {
            store_ids: vec![],
            available_only: true,
            offset: 0,
            limit: Some(10),
        })
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.products.len(), 1);

    let own = store
        .list_products(ProductFilter::for_store(product.store_id))
        .await
        .unwrap();
    assert_eq!(own.total, 1);
    assert!(!own.products[0].is_available);

    let foreign = store.delete_product(StoreId::new(), product.id).await;
    assert!(matches!(foreign, Err(StorageError::NotFound { .. })));
}

#[tokio::test]
#[serial]
async fn update_product_coalesces_fields() {
    let store = get_test_store().await;
    let product = seed_product(&store, 5).await;
    store.reserve_stock(product.id, 2).await.unwrap();

    let renamed = store
        .update_product(
            product.store_id,
            product.id,
            ProductUpdate {
                product_name: Some("Kettle".to_string()),
                description: Some(None),
                ..ProductUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.product_name, "Kettle");
    assert_eq!(renamed.description, None);
    assert_eq!(renamed.price, product.price);
    assert_eq!(renamed.quantity, 3);

    let restocked = store
        .update_product(
            product.store_id,
            product.id,
            ProductUpdate {
                max_quantity: Some(10),
                quantity: Some(10),
                ..ProductUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(restocked.max_quantity, 10);
    assert_eq!(restocked.quantity, 10);
    assert_eq!(restocked.product_name, "Kettle");

    let result = store
        .update_product(StoreId::new(), product.id, ProductUpdate::default())
        .await;
    assert!(matches!(result, Err(StorageError::NotFound { .. })));
}

#[tokio::test]
#[serial]
async fn likes_are_unique_per_product() {
    let store = get_test_store().await;
    let product = seed_product(&store, 1).await;
    let user = UserId::new();

    let first = store.insert_like(Like::new(user, product.id)).await.unwrap();
    let again = store.insert_like(Like::new(user, product.id)).await.unwrap();
    assert_eq!(again.id, first.id);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM likes")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(store.likes_for_user(user).await.unwrap().len(), 1);

    store.delete_like(user, product.id).await.unwrap();
    let result = store.delete_like(user, product.id).await;
    assert!(matches!(result, Err(StorageError::NotFound { .. })));
    assert!(store.likes_for_user(user).await.unwrap().is_empty());
}
