//! Read-side order views for customers and administrators.

use std::collections::HashMap;

use common::{CartLineId, ProductId, UserId};
use serde::Serialize;
use storage::{CartLine, CommerceStore, Order, Product};

use crate::error::Result;

/// An order joined with the cart line it was created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub cart_line: Option<CartLine>,
    /// `None` if the product was deleted after the order was placed.
    pub product: Option<Product>,
}

pub struct OrderHistory<S: CommerceStore> {
    store: S,
}

impl<S: CommerceStore> OrderHistory<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// A user's orders, oldest first, with line and product detail.
    #[tracing::instrument(skip(self))]
    pub async fn user_orders(&self, user_id: UserId) -> Result<Vec<OrderDetail>> {
        let orders = self.store.orders_for_user(user_id).await?;

        let line_ids: Vec<CartLineId> = orders.iter().map(|o| o.cart_line_id).collect();
        let lines: HashMap<CartLineId, CartLine> = self
            .store
            .get_cart_lines(&line_ids)
            .await?
            .into_iter()
            .map(|l| (l.id, l))
            .collect();

        let product_ids: Vec<ProductId> = lines.values().map(|l| l.product_id).collect();
        let products: HashMap<ProductId, Product> = self
            .store
            .get_products(&product_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        Ok(orders
            .into_iter()
            .map(|order| {
                let cart_line = lines.get(&order.cart_line_id).cloned();
                let product = cart_line
                    .as_ref()
                    .and_then(|l| products.get(&l.product_id).cloned());
                OrderDetail {
                    order,
                    cart_line,
                    product,
                }
            })
            .collect())
    }

    /// Every order in the system, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn all_orders(&self) -> Result<Vec<Order>> {
        Ok(self.store.all_orders().await?)
    }
}
