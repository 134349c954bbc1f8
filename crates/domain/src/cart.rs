//! Cart aggregate: one open line per (user, product), backed by stock
//! reservations.

use std::collections::{HashMap, HashSet};

use common::{CartLineId, Money, ProductId, StoreId, UserId};
use serde::Serialize;
use storage::{CartChange, CartLine, CommerceStore, Product, StorageError};

use crate::error::{DomainError, Result};
use crate::inventory::InventoryLedger;

/// Attempts made when a line changes between read and write.
pub const MAX_CONFLICT_RETRIES: usize = 3;

/// An open cart line with its product detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartItem {
    #[serde(flatten)]
    pub line: CartLine,
    /// `None` if the product was deleted after the line was created.
    pub product: Option<Product>,
    pub store_name: Option<String>,
    pub total_price: Money,
}

/// Snapshot of a user's open cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub items: Vec<CartItem>,
    pub cart_total_price: Money,
}

/// Result of [`CartService::sync_cart`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub synced: usize,
    pub cart: CartView,
}

/// Service for cart operations.
///
/// Every mutation commits its stock delta and its line change together.
/// Updates and removals carry the quantity they read; a line that changed
/// in between surfaces as a storage conflict and the service re-reads and
/// retries up to [`MAX_CONFLICT_RETRIES`] times. Balances left by a
/// release are audited by the [`InventoryLedger`].
pub struct CartService<S: CommerceStore> {
    store: S,
    ledger: InventoryLedger<S>,
}

impl<S: CommerceStore + Clone> CartService<S> {
    /// Creates a new cart service with the given store.
    pub fn new(store: S) -> Self {
        Self {
            ledger: InventoryLedger::new(store.clone()),
            store,
        }
    }

    /// Reserves one unit of the product into the user's open line,
    /// creating the line if needed.
    ///
    /// The lookup of the open line and the increment happen in the same
    /// storage unit, so concurrent adds for one (user, product) pair never
    /// race each other.
    #[tracing::instrument(skip(self))]
    pub async fn add_to_cart(&self, user_id: UserId, product_id: ProductId) -> Result<CartLine> {
        let change = CartChange::upsert(CartLine::open(user_id, product_id, 1));

        match self.store.apply_cart_change(change).await {
            Ok(outcome) => {
                metrics::counter!("cart_reservations_total").increment(1);
                tracing::info!(
                    product_id = %product_id,
                    remaining = ?outcome.remaining_stock,
                    "Reserved one unit"
                );
                outcome
                    .line
                    .ok_or_else(|| DomainError::Conflict("cart line vanished".to_string()))
            }
            Err(StorageError::InsufficientStock { product_id, .. }) => {
                metrics::counter!("cart_reservation_failures_total").increment(1);
                Err(DomainError::OutOfStock { product_id })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes an open line and releases every unit it held.
    #[tracing::instrument(skip(self))]
    pub async fn remove_from_cart(&self, user_id: UserId, line_id: CartLineId) -> Result<()> {
        for attempt in 1..=MAX_CONFLICT_RETRIES {
            let line = self.own_open_line(user_id, line_id).await?;
            match self.store.apply_cart_change(CartChange::delete(&line)).await {
                Ok(outcome) => {
                    tracing::info!(line_id = %line_id, released = line.quantity, "Removed cart line");
                    if let Some(balance) = outcome.remaining_stock {
                        self.ledger.audit_release(line.product_id, balance).await;
                    }
                    return Ok(());
                }
                Err(StorageError::Conflict(msg)) => {
                    tracing::debug!(attempt, %msg, "Cart line changed concurrently, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(DomainError::Conflict(format!("cart line {line_id} kept changing")))
    }

    /// Sets the quantity of an open line.
    ///
    /// A quantity of zero or less deletes the line. Returns the updated
    /// line, or `None` if it was deleted.
    #[tracing::instrument(skip(self))]
    pub async fn update_cart_item(
        &self,
        user_id: UserId,
        line_id: CartLineId,
        quantity: i64,
    ) -> Result<Option<CartLine>> {
        for attempt in 1..=MAX_CONFLICT_RETRIES {
            let line = self.own_open_line(user_id, line_id).await?;

            let change = if quantity <= 0 {
                CartChange::delete(&line)
            } else {
                let quantity = u32::try_from(quantity).map_err(|_| {
                    DomainError::Validation(format!("quantity too large: {quantity}"))
                })?;
                if quantity == line.quantity {
                    return Ok(Some(line));
                }
                CartChange::resize(&line, quantity)
            };
            let reserving = change.stock_delta < 0;

            match self.store.apply_cart_change(change).await {
                Ok(outcome) => {
                    if reserving {
                        metrics::counter!("cart_reservations_total").increment(1);
                    } else if let Some(balance) = outcome.remaining_stock {
                        self.ledger.audit_release(line.product_id, balance).await;
                    }
                    return Ok(outcome.line);
                }
                Err(StorageError::Conflict(msg)) => {
                    tracing::debug!(attempt, %msg, "Cart line changed concurrently, retrying");
                }
                Err(e @ StorageError::InsufficientStock { .. }) => {
                    metrics::counter!("cart_reservation_failures_total").increment(1);
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(DomainError::Conflict(format!("cart line {line_id} kept changing")))
    }

    /// Returns the user's open lines with product detail and totals.
    #[tracing::instrument(skip(self))]
    pub async fn get_cart_items(&self, user_id: UserId) -> Result<CartView> {
        let lines = self.store.open_cart_lines(user_id).await?;

        let product_ids: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
        let products: HashMap<ProductId, Product> = self
            .store
            .get_products(&product_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let store_ids: HashSet<StoreId> = products.values().map(|p| p.store_id).collect();
        let mut store_names = HashMap::with_capacity(store_ids.len());
        for store_id in store_ids {
            if let Some(record) = self.store.get_store(store_id).await? {
                store_names.insert(store_id, record.store_name);
            }
        }

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let product = products.get(&line.product_id).cloned();
            let total_price = match &product {
                Some(p) => p.price.checked_mul(line.quantity)?,
                None => Money::zero(),
            };
            let store_name = product
                .as_ref()
                .and_then(|p| store_names.get(&p.store_id).cloned());
            items.push(CartItem {
                line,
                product,
                store_name,
                total_price,
            });
        }
        let cart_total_price = Money::checked_sum(items.iter().map(|i| i.total_price))?;

        Ok(CartView {
            items,
            cart_total_price,
        })
    }

    /// Adds one unit of each listed product the user does not already have
    /// in an open line.
    ///
    /// Unknown, out-of-stock and already present products are skipped.
    #[tracing::instrument(skip(self, product_ids), fields(requested = product_ids.len()))]
    pub async fn sync_cart(
        &self,
        user_id: UserId,
        product_ids: Vec<ProductId>,
    ) -> Result<SyncOutcome> {
        let mut seen = HashSet::new();
        let mut synced = 0;

        for product_id in product_ids {
            if !seen.insert(product_id) {
                continue;
            }
            if self.store.open_cart_line(user_id, product_id).await?.is_some() {
                continue;
            }

            let change = CartChange::insert(CartLine::open(user_id, product_id, 1));
            match self.store.apply_cart_change(change).await {
                Ok(_) => {
                    metrics::counter!("cart_reservations_total").increment(1);
                    synced += 1;
                }
                Err(
                    StorageError::NotFound { .. }
                    | StorageError::InsufficientStock { .. }
                    | StorageError::Conflict(_),
                ) => {
                    tracing::debug!(product_id = %product_id, "Skipping product during sync");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let cart = self.get_cart_items(user_id).await?;
        Ok(SyncOutcome { synced, cart })
    }

    /// Loads a line that is open and owned by the user.
    ///
    /// Ordered lines and other users' lines are reported as not found.
    async fn own_open_line(&self, user_id: UserId, line_id: CartLineId) -> Result<CartLine> {
        match self.store.get_cart_line(line_id).await? {
            Some(line) if line.user_id == user_id && !line.ordered => Ok(line),
            _ => Err(DomainError::not_found("cart line", line_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use storage::{InMemoryStore, StoreRecord};

    use super::*;

    async fn setup(quantity: u32) -> (CartService<InMemoryStore>, InMemoryStore, Product) {
        let store = InMemoryStore::new();
        let owner = store
            .insert_store(StoreRecord::new("Lamp Shop"))
            .await
            .unwrap();
        let product = store
            .insert_product(Product {
                id: ProductId::new(),
                store_id: owner.id,
                product_name: "Lamp".to_string(),
                description: None,
                price: Money::from_minor(1999),
                max_quantity: quantity,
                quantity,
                images: vec!["lamp.png".to_string()],
                is_available: true,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        (CartService::new(store.clone()), store, product)
    }

    #[tokio::test]
    async fn repeat_add_grows_one_line() {
        let (cart, _, product) = setup(5).await;
        let user = UserId::new();

        cart.add_to_cart(user, product.id).await.unwrap();
        let line = cart.add_to_cart(user, product.id).await.unwrap();

        assert_eq!(line.quantity, 2);
        let view = cart.get_cart_items(user).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.cart_total_price, Money::from_minor(3998));
        assert_eq!(view.items[0].store_name.as_deref(), Some("Lamp Shop"));
    }

    #[tokio::test]
    async fn add_unknown_product_is_not_found() {
        let (cart, _, _) = setup(1).await;
        let result = cart.add_to_cart(UserId::new(), ProductId::new()).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn remove_rejects_other_users_line() {
        let (cart, _, product) = setup(2).await;
        let owner = UserId::new();
        let line = cart.add_to_cart(owner, product.id).await.unwrap();

        let result = cart.remove_from_cart(UserId::new(), line.id).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn update_to_zero_deletes_line() {
        let (cart, store, product) = setup(2).await;
        let user = UserId::new();
        let line = cart.add_to_cart(user, product.id).await.unwrap();

        let result = cart.update_cart_item(user, line.id, 0).await.unwrap();
        assert!(result.is_none());
        let product = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(product.quantity, 2);
    }

    #[tokio::test]
    async fn update_same_quantity_is_noop() {
        let (cart, store, product) = setup(2).await;
        let user = UserId::new();
        let line = cart.add_to_cart(user, product.id).await.unwrap();

        let same = cart.update_cart_item(user, line.id, 1).await.unwrap();
        assert_eq!(same, Some(line));
        let product = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(product.quantity, 1);
    }

    #[tokio::test]
    async fn cart_item_of_deleted_product_costs_nothing() {
        let (cart, store, product) = setup(2).await;
        let user = UserId::new();
        cart.add_to_cart(user, product.id).await.unwrap();
        store
            .delete_product(product.store_id, product.id)
            .await
            .unwrap();

        let view = cart.get_cart_items(user).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert!(view.items[0].product.is_none());
        assert!(view.cart_total_price.is_zero());
    }

    #[tokio::test]
    async fn release_above_max_is_kept() {
        let (cart, store, product) = setup(2).await;
        let user = UserId::new();
        let line = cart.add_to_cart(user, product.id).await.unwrap();
        store.release_stock(product.id, 1).await.unwrap();

        cart.remove_from_cart(user, line.id).await.unwrap();

        let product = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(product.quantity, 3);
        assert!(cart.ledger.audit_release(product.id, product.quantity).await);
    }

    #[tokio::test]
    async fn overflowing_line_total_is_an_error() {
        let (cart, store, _) = setup(2).await;
        let pricey = store
            .insert_product(Product {
                id: ProductId::new(),
                store_id: StoreId::new(),
                product_name: "Chandelier".to_string(),
                description: None,
                price: Money::from_minor(50_000_000_000_000_000),
                max_quantity: 500,
                quantity: 500,
                images: vec!["chandelier.png".to_string()],
                is_available: true,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let user = UserId::new();
        let line = cart.add_to_cart(user, pricey.id).await.unwrap();
        cart.update_cart_item(user, line.id, 400).await.unwrap();

        let result = cart.get_cart_items(user).await;
        assert!(matches!(result, Err(DomainError::Money(_))));
    }

    #[tokio::test]
    async fn sync_with_no_ids_returns_current_cart() {
        let (cart, _, product) = setup(2).await;
        let user = UserId::new();
        cart.add_to_cart(user, product.id).await.unwrap();

        let outcome = cart.sync_cart(user, vec![]).await.unwrap();
        assert_eq!(outcome.synced, 0);
        assert_eq!(outcome.cart.items.len(), 1);
    }
}
