//! Order materialization: open cart lines become orders under one gateway
//! transaction.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use common::{FulfillmentStatus, Money, OrderId, PaymentStatus, ProductId, StoreId, UserId};
use serde::Serialize;
use domain::DomainError;
use storage::{CommerceStore, Order, PAYMENT_METHOD_GATEWAY, PricedOrder, Product};

use crate::error::{CheckoutError, Result};
use crate::gateway::{GatewayTransaction, PaymentGateway};

/// Store name recorded when the product's store no longer exists.
pub const UNKNOWN_STORE_NAME: &str = "Unknown Store";

/// Result of a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReceipt {
    pub gateway_order: GatewayTransaction,
    pub orders: Vec<Order>,
    pub total_orders: usize,
}

/// Converts a user's open cart lines into one order per line.
///
/// Orders are written and their lines flagged as ordered in a single
/// storage unit, so a checkout either materializes every fresh line or
/// none. Lines consumed by a concurrent checkout, or resized after they
/// were priced, make the whole attempt fail with a conflict; retrying only
/// sees lines that are still open, at their current quantity.
pub struct OrderMaterializer<S: CommerceStore, G: PaymentGateway> {
    store: S,
    gateway: G,
    currency: String,
    timeout: Duration,
}

impl<S: CommerceStore, G: PaymentGateway> OrderMaterializer<S, G> {
    /// Creates a new materializer. Every gateway call is bounded by `timeout`.
    pub fn new(store: S, gateway: G, currency: impl Into<String>, timeout: Duration) -> Self {
        Self {
            store,
            gateway,
            currency: currency.into(),
            timeout,
        }
    }

    /// Places orders for every open cart line of the user.
    ///
    /// `amount` is charged on the gateway as given. Each order carries the
    /// price of its own line.
    #[tracing::instrument(skip(self, address))]
    pub async fn create_order(
        &self,
        user_id: UserId,
        address: String,
        amount: Money,
    ) -> Result<CheckoutReceipt> {
        let start = Instant::now();
        if !amount.is_positive() {
            return Err(CheckoutError::Validation(
                "Valid amount is required".to_string(),
            ));
        }

        let lines = self.store.open_cart_lines(user_id).await?;
        if lines.is_empty() {
            return Err(CheckoutError::NoItemsToOrder);
        }

        let product_ids: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
        let products: HashMap<ProductId, Product> = self
            .store
            .get_products(&product_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut priced = Vec::with_capacity(lines.len());
        for line in lines {
            match products.get(&line.product_id) {
                Some(product) => {
                    let line_amount = product
                        .price
                        .checked_mul(line.quantity)
                        .map_err(DomainError::from)?;
                    priced.push((line, product, line_amount));
                }
                None => tracing::warn!(
                    line_id = %line.id,
                    product_id = %line.product_id,
                    "Skipping cart line whose product is missing"
                ),
            }
        }
        if priced.is_empty() {
            return Err(CheckoutError::NoItemsToOrder);
        }

        let computed = Money::checked_sum(priced.iter().map(|(_, _, line_amount)| *line_amount))
            .map_err(DomainError::from)?;
        if computed != amount {
            tracing::warn!(
                requested = %amount,
                computed = %computed,
                "Checkout amount differs from cart total"
            );
        }

        let store_names = self
            .store_names(priced.iter().map(|(_, p, _)| p.store_id))
            .await?;
        let transaction = self.request_transaction(amount).await?;

        let now = Utc::now();
        let orders: Vec<PricedOrder> = priced
            .into_iter()
            .map(|(line, product, line_amount)| {
                let order = Order {
                    id: OrderId::new(),
                    user_id,
                    store_id: product.store_id,
                    store_name: store_names
                        .get(&product.store_id)
                        .cloned()
                        .unwrap_or_else(|| UNKNOWN_STORE_NAME.to_string()),
                    cart_line_id: line.id,
                    address: address.clone(),
                    amount: line_amount,
                    gateway_order_id: transaction.id.clone(),
                    gateway_payment_id: None,
                    gateway_signature: None,
                    payment_method: PAYMENT_METHOD_GATEWAY.to_string(),
                    payment_status: PaymentStatus::Pending,
                    status: FulfillmentStatus::Pending,
                    shipment_id: None,
                    return_reason: None,
                    return_requested_at: None,
                    created_at: now,
                };
                PricedOrder::new(order, line.quantity)
            })
            .collect();

        let orders = self.store.materialize_orders(orders).await.inspect_err(|e| {
            tracing::warn!(
                gateway_order_id = %transaction.id,
                error = %e,
                "Cart lines changed during checkout"
            );
        })?;

        metrics::counter!("orders_materialized_total").increment(orders.len() as u64);
        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());
        tracing::info!(
            gateway_order_id = %transaction.id,
            orders = orders.len(),
            "Orders created"
        );

        Ok(CheckoutReceipt {
            total_orders: orders.len(),
            gateway_order: transaction,
            orders,
        })
    }

    /// Creates a standalone gateway transaction, outside any cart.
    #[tracing::instrument(skip(self))]
    pub async fn create_payment_transaction(&self, amount: Money) -> Result<GatewayTransaction> {
        if !amount.is_positive() {
            return Err(CheckoutError::Validation(
                "Valid amount is required".to_string(),
            ));
        }
        self.request_transaction(amount).await
    }

    /// Public gateway key for the client checkout widget.
    pub fn gateway_key(&self) -> &str {
        self.gateway.key_id()
    }

    async fn request_transaction(&self, amount: Money) -> Result<GatewayTransaction> {
        match tokio::time::timeout(
            self.timeout,
            self.gateway.create_transaction(amount, &self.currency),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(timeout = ?self.timeout, "Gateway did not answer in time");
                Err(CheckoutError::UpstreamUnavailable(
                    "gateway timed out".to_string(),
                ))
            }
        }
    }

    async fn store_names(
        &self,
        store_ids: impl Iterator<Item = StoreId>,
    ) -> Result<HashMap<StoreId, String>> {
        let mut names = HashMap::new();
        for store_id in store_ids {
            if names.contains_key(&store_id) {
                continue;
            }
            if let Some(record) = self.store.get_store(store_id).await? {
                names.insert(store_id, record.store_name);
            }
        }
        Ok(names)
    }
}
