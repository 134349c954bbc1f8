use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{CartLineId, FulfillmentStatus, OrderId, PaymentStatus, ProductId, StoreId, UserId};
use tokio::sync::RwLock;

use crate::{
    CartLine, Like, Order, Product, Result, Shipment, StorageError, StoreRecord,
    store::{
        CartChange, CartChangeOutcome, CommerceStore, FulfillmentTransition, LineMutation,
        PricedOrder, ProductFilter, ProductPage, ProductUpdate, Settlement,
    },
};

#[derive(Default)]
struct State {
    stores: HashMap<StoreId, StoreRecord>,
    // Vecs keep insertion order for listings.
    products: Vec<Product>,
    cart_lines: Vec<CartLine>,
    orders: Vec<Order>,
    shipments: HashMap<OrderId, Shipment>,
    likes: Vec<Like>,
}

impl State {
    fn product_index(&self, product_id: ProductId) -> Option<usize> {
        self.products.iter().position(|p| p.id == product_id)
    }

    fn line_index(&self, line_id: CartLineId) -> Option<usize> {
        self.cart_lines.iter().position(|l| l.id == line_id)
    }

    fn order_index(&self, order_id: OrderId) -> Option<usize> {
        self.orders.iter().position(|o| o.id == order_id)
    }

    fn open_line_index(&self, user_id: UserId, product_id: ProductId) -> Option<usize> {
        self.cart_lines
            .iter()
            .position(|l| !l.ordered && l.user_id == user_id && l.product_id == product_id)
    }

    /// Checks that `line_id` is open and still holds `expected` units.
    fn check_open_line(&self, line_id: CartLineId, expected: u32) -> Result<usize> {
        let index = self
            .line_index(line_id)
            .ok_or_else(|| StorageError::not_found("cart line", line_id))?;
        let line = &self.cart_lines[index];
        if line.ordered {
            return Err(StorageError::Conflict(format!(
                "cart line {line_id} is already ordered"
            )));
        }
        if line.quantity != expected {
            return Err(StorageError::Conflict(format!(
                "cart line {line_id} changed: expected quantity {expected}, found {}",
                line.quantity
            )));
        }
        Ok(index)
    }

    /// Computes the product quantity after applying `delta`, without writing.
    fn stock_after(&self, product_id: ProductId, delta: i64) -> Result<Option<(usize, u32)>> {
        let Some(index) = self.product_index(product_id) else {
            if delta < 0 {
                return Err(StorageError::not_found("product", product_id));
            }
            return Ok(None);
        };

        let available = self.products[index].quantity;
        let next = i64::from(available) + delta;
        if next < 0 {
            return Err(StorageError::InsufficientStock {
                product_id,
                requested: u32::try_from(-delta).unwrap_or(u32::MAX),
                available,
            });
        }
        let next = u32::try_from(next)
            .map_err(|_| StorageError::Corrupt(format!("stock overflow for {product_id}")))?;
        Ok(Some((index, next)))
    }
}

/// In-memory store implementation for tests and local runs.
///
/// A single write lock serializes every mutating call, which gives each
/// trait method the same all-or-nothing behavior as a database transaction.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

#[async_trait]
impl CommerceStore for InMemoryStore {
    async fn insert_store(&self, store: StoreRecord) -> Result<StoreRecord> {
        let mut state = self.state.write().await;
        if state.stores.contains_key(&store.id) {
            return Err(StorageError::AlreadyExists {
                entity: "store",
                id: store.id.to_string(),
            });
        }
        state.stores.insert(store.id, store.clone());
        Ok(store)
    }

    async fn get_store(&self, store_id: StoreId) -> Result<Option<StoreRecord>> {
        Ok(self.state.read().await.stores.get(&store_id).cloned())
    }

    async fn insert_product(&self, product: Product) -> Result<Product> {
        let mut state = self.state.write().await;
        if state.product_index(product.id).is_some() {
            return Err(StorageError::AlreadyExists {
                entity: "product",
                id: product.id.to_string(),
            });
        }
        state.products.push(product.clone());
        Ok(product)
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let state = self.state.read().await;
        Ok(state.products.iter().find(|p| p.id == product_id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        Ok(state
            .products
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn list_products(&self, filter: ProductFilter) -> Result<ProductPage> {
        let state = self.state.read().await;
        let matching: Vec<&Product> = state
            .products
            .iter()
            .filter(|p| filter.store_ids.is_empty() || filter.store_ids.contains(&p.store_id))
            .filter(|p| !filter.available_only || p.is_available)
            .collect();

        let total = matching.len() as u64;
        let offset = usize::try_from(filter.offset).unwrap_or(usize::MAX);
        let page = matching.into_iter().skip(offset);
        let products = match filter.limit {
            Some(limit) => page
                .take(usize::try_from(limit).unwrap_or(usize::MAX))
                .cloned()
                .collect(),
            None => page.cloned().collect(),
        };

        Ok(ProductPage { products, total })
    }

    async fn toggle_product_availability(
        &self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<Product> {
        let mut state = self.state.write().await;
        let product = state
            .products
            .iter_mut()
            .find(|p| p.id == product_id && p.store_id == store_id)
            .ok_or_else(|| StorageError::not_found("product", product_id))?;
        product.is_available = !product.is_available;
        Ok(product.clone())
    }

    async fn update_product(
        &self,
        store_id: StoreId,
        product_id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product> {
        let mut state = self.state.write().await;
        let product = state
            .products
            .iter_mut()
            .find(|p| p.id == product_id && p.store_id == store_id)
            .ok_or_else(|| StorageError::not_found("product", product_id))?;
        update.apply_to(product);
        Ok(product.clone())
    }

    async fn delete_product(&self, store_id: StoreId, product_id: ProductId) -> Result<()> {
        let mut state = self.state.write().await;
        let index = state
            .products
            .iter()
            .position(|p| p.id == product_id && p.store_id == store_id)
            .ok_or_else(|| StorageError::not_found("product", product_id))?;
        state.products.remove(index);
        Ok(())
    }

    async fn reserve_stock(&self, product_id: ProductId, units: u32) -> Result<u32> {
        let mut state = self.state.write().await;
        match state.stock_after(product_id, -i64::from(units))? {
            Some((index, next)) => {
                state.products[index].quantity = next;
                Ok(next)
            }
            None => Err(StorageError::not_found("product", product_id)),
        }
    }

    async fn release_stock(&self, product_id: ProductId, units: u32) -> Result<u32> {
        let mut state = self.state.write().await;
        match state.stock_after(product_id, i64::from(units))? {
            Some((index, next)) => {
                state.products[index].quantity = next;
                Ok(next)
            }
            None => Err(StorageError::not_found("product", product_id)),
        }
    }

    async fn get_cart_line(&self, line_id: CartLineId) -> Result<Option<CartLine>> {
        let state = self.state.read().await;
        Ok(state.cart_lines.iter().find(|l| l.id == line_id).cloned())
    }

    async fn get_cart_lines(&self, ids: &[CartLineId]) -> Result<Vec<CartLine>> {
        let state = self.state.read().await;
        Ok(state
            .cart_lines
            .iter()
            .filter(|l| ids.contains(&l.id))
            .cloned()
            .collect())
    }

    async fn open_cart_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<CartLine>> {
        let state = self.state.read().await;
        Ok(state
            .open_line_index(user_id, product_id)
            .map(|index| state.cart_lines[index].clone()))
    }

    async fn open_cart_lines(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        let state = self.state.read().await;
        Ok(state
            .cart_lines
            .iter()
            .filter(|l| !l.ordered && l.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn apply_cart_change(&self, change: CartChange) -> Result<CartChangeOutcome> {
        let mut state = self.state.write().await;

        // Validate everything before the first write.
        let line_index = match &change.line {
            LineMutation::Insert(line) => {
                if state.open_line_index(line.user_id, line.product_id).is_some() {
                    return Err(StorageError::Conflict(format!(
                        "open cart line already exists for product {}",
                        line.product_id
                    )));
                }
                None
            }
            LineMutation::Upsert(line) => state.open_line_index(line.user_id, line.product_id),
            LineMutation::SetQuantity {
                line_id, expected, ..
            }
            | LineMutation::Delete { line_id, expected } => {
                Some(state.check_open_line(*line_id, *expected)?)
            }
        };
        let stock = state.stock_after(change.product_id, change.stock_delta)?;

        let remaining_stock = stock.map(|(index, next)| {
            state.products[index].quantity = next;
            next
        });

        let line = match (change.line, line_index) {
            (LineMutation::Insert(line), _) | (LineMutation::Upsert(line), None) => {
                state.cart_lines.push(line.clone());
                Some(line)
            }
            (LineMutation::Upsert(line), Some(index)) => {
                state.cart_lines[index].quantity += line.quantity;
                Some(state.cart_lines[index].clone())
            }
            (LineMutation::SetQuantity { quantity, .. }, Some(index)) => {
                state.cart_lines[index].quantity = quantity;
                Some(state.cart_lines[index].clone())
            }
            (LineMutation::Delete { .. }, Some(index)) => {
                state.cart_lines.remove(index);
                None
            }
            (_, None) => None,
        };

        Ok(CartChangeOutcome {
            line,
            remaining_stock,
        })
    }

    async fn materialize_orders(&self, orders: Vec<PricedOrder>) -> Result<Vec<Order>> {
        let mut state = self.state.write().await;

        let mut line_indices = Vec::with_capacity(orders.len());
        for priced in &orders {
            let index = state.check_open_line(priced.order.cart_line_id, priced.line_quantity)?;
            if line_indices.contains(&index) {
                return Err(StorageError::Conflict(format!(
                    "cart line {} is already ordered",
                    priced.order.cart_line_id
                )));
            }
            line_indices.push(index);
        }

        for index in line_indices {
            state.cart_lines[index].ordered = true;
        }
        let orders: Vec<Order> = orders.into_iter().map(|p| p.order).collect();
        state.orders.extend(orders.iter().cloned());
        Ok(orders)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.iter().find(|o| o.id == order_id).cloned())
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn orders_for_store(&self, store_id: StoreId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .iter()
            .rev()
            .filter(|o| o.store_id == store_id)
            .cloned()
            .collect())
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.iter().rev().cloned().collect())
    }

    async fn orders_for_transaction(&self, gateway_order_id: &str) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .iter()
            .filter(|o| o.gateway_order_id == gateway_order_id)
            .cloned()
            .collect())
    }

    async fn settle_transaction(&self, settlement: Settlement) -> Result<u64> {
        let mut state = self.state.write().await;
        let sources = PaymentStatus::sources_for(settlement.status);

        let mut updated = 0;
        for order in state
            .orders
            .iter_mut()
            .filter(|o| o.gateway_order_id == settlement.gateway_order_id)
            .filter(|o| o.user_id == settlement.user_id)
            .filter(|o| sources.contains(&o.payment_status))
        {
            order.payment_status = settlement.status;
            if let Some(ref payment_id) = settlement.payment_id {
                order.gateway_payment_id = Some(payment_id.clone());
            }
            if let Some(ref signature) = settlement.signature {
                order.gateway_signature = Some(signature.clone());
            }
            updated += 1;
        }
        Ok(updated)
    }

    async fn transition_fulfillment(&self, transition: FulfillmentTransition) -> Result<Order> {
        let mut state = self.state.write().await;
        let index = state
            .order_index(transition.order_id)
            .ok_or_else(|| StorageError::not_found("order", transition.order_id))?;

        let order = &mut state.orders[index];
        if order.status != transition.expected {
            return Err(StorageError::Conflict(format!(
                "order {} changed: expected {}, found {}",
                order.id, transition.expected, order.status
            )));
        }
        order.status = transition.next;
        if let Some(request) = transition.return_request {
            order.return_reason = Some(request.reason);
            order.return_requested_at = Some(request.requested_at);
        }
        Ok(order.clone())
    }

    async fn create_shipment(
        &self,
        shipment: Shipment,
        expected: FulfillmentStatus,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        if state.shipments.contains_key(&shipment.order_id) {
            return Err(StorageError::AlreadyExists {
                entity: "shipment",
                id: shipment.order_id.to_string(),
            });
        }
        let index = state
            .order_index(shipment.order_id)
            .ok_or_else(|| StorageError::not_found("order", shipment.order_id))?;
        if state.orders[index].status != expected {
            return Err(StorageError::Conflict(format!(
                "order {} changed: expected {expected}, found {}",
                shipment.order_id, state.orders[index].status
            )));
        }

        let order = &mut state.orders[index];
        order.status = FulfillmentStatus::Shipped;
        order.shipment_id = Some(shipment.id);
        let order = order.clone();
        state.shipments.insert(shipment.order_id, shipment);
        Ok(order)
    }

    async fn shipment_for_order(&self, order_id: OrderId) -> Result<Option<Shipment>> {
        Ok(self.state.read().await.shipments.get(&order_id).cloned())
    }

    async fn insert_like(&self, like: Like) -> Result<Like> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .likes
            .iter()
            .find(|l| l.user_id == like.user_id && l.product_id == like.product_id)
        {
            return Ok(existing.clone());
        }
        state.likes.push(like.clone());
        Ok(like)
    }

    async fn likes_for_user(&self, user_id: UserId) -> Result<Vec<Like>> {
        let state = self.state.read().await;
        Ok(state
            .likes
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_like(&self, user_id: UserId, product_id: ProductId) -> Result<Like> {
        let mut state = self.state.write().await;
        let index = state
            .likes
            .iter()
            .position(|l| l.user_id == user_id && l.product_id == product_id)
            .ok_or_else(|| StorageError::not_found("like", product_id))?;
        Ok(state.likes.remove(index))
    }
}
