//! HTTP API server with observability for the commerce backend.
//!
//! Provides REST endpoints for the catalog, carts, likes, checkout, payment
//! callbacks, store order management and shipping, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod principal;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{delete, get, patch, post, put};
use checkout::{
    MockCourier, OrderMaterializer, PaymentGateway, PaymentReconciler, ShippingService,
    SignatureVerifier,
};
use domain::{CartService, CatalogService, LikeService, OrderHistory, StoreOrderService};
use metrics_exporter_prometheus::PrometheusHandle;
use storage::CommerceStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: CommerceStore> {
    pub catalog: CatalogService<S>,
    pub cart: CartService<S>,
    pub likes: LikeService<S>,
    pub lifecycle: StoreOrderService<S>,
    pub history: OrderHistory<S>,
    pub checkout: OrderMaterializer<S, Arc<dyn PaymentGateway>>,
    pub reconciler: PaymentReconciler<S>,
    pub shipping: ShippingService<S, MockCourier>,
}

impl<S: CommerceStore + Clone> AppState<S> {
    /// Wires every service onto one store and gateway.
    pub fn new(
        store: S,
        gateway: Arc<dyn PaymentGateway>,
        verifier: SignatureVerifier,
        currency: &str,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            catalog: CatalogService::new(store.clone()),
            cart: CartService::new(store.clone()),
            likes: LikeService::new(store.clone()),
            lifecycle: StoreOrderService::new(store.clone()),
            history: OrderHistory::new(store.clone()),
            checkout: OrderMaterializer::new(
                store.clone(),
                gateway,
                currency,
                gateway_timeout,
            ),
            reconciler: PaymentReconciler::new(store.clone(), verifier),
            shipping: ShippingService::new(store, MockCourier),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CommerceStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        // Stores
        .route("/stores", post(routes::stores::register::<S>))
        .route(
            "/stores/products",
            get(routes::stores::list_products::<S>).post(routes::stores::add_product::<S>),
        )
        .route(
            "/stores/products/{id}/availability",
            patch(routes::stores::toggle_availability::<S>),
        )
        .route(
            "/stores/products/{id}",
            put(routes::stores::update_product::<S>).delete(routes::stores::delete_product::<S>),
        )
        .route("/stores/orders", get(routes::stores::list_orders::<S>))
        .route(
            "/stores/orders/{id}/status",
            patch(routes::stores::update_order_status::<S>),
        )
        // Public catalog
        .route("/products", get(routes::products::list::<S>))
        .route("/products/{id}", get(routes::products::get::<S>))
        // Cart
        .route("/cart", get(routes::cart::items::<S>))
        .route("/cart/sync", post(routes::cart::sync::<S>))
        .route("/cart/{product_id}", post(routes::cart::add::<S>))
        .route("/cart/update/{id}", put(routes::cart::update::<S>))
        .route("/cart/remove/{id}", delete(routes::cart::remove::<S>))
        // Likes
        .route("/likes", get(routes::likes::list::<S>))
        .route(
            "/likes/{product_id}",
            post(routes::likes::add::<S>).delete(routes::likes::remove::<S>),
        )
        // Orders and payments
        .route(
            "/orders",
            get(routes::orders::list::<S>).post(routes::orders::create::<S>),
        )
        .route("/orders/verify", post(routes::orders::verify::<S>))
        .route(
            "/orders/payment-failed",
            post(routes::orders::payment_failed::<S>),
        )
        .route(
            "/orders/payment",
            get(routes::orders::gateway_key::<S>).post(routes::orders::create_payment::<S>),
        )
        .route("/orders/all", get(routes::orders::all::<S>))
        .route("/orders/return/{id}", put(routes::orders::request_return::<S>))
        // Shipping
        .route(
            "/shipping/{order_id}",
            get(routes::shipping::get::<S>).post(routes::shipping::ship::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
