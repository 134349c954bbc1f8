use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    CartLineId, FulfillmentStatus, Money, OrderId, PaymentStatus, ProductId, StoreId, UserId,
};

use crate::{CartLine, Like, Order, Product, Result, Shipment, StoreRecord};

/// The cart line half of a [`CartChange`].
///
/// Updates and deletes carry the quantity the caller last read. If the line
/// no longer has that quantity the change fails with `Conflict` and nothing
/// is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineMutation {
    /// Insert a new open line. Fails with `Conflict` if the user already
    /// has an open line for the product.
    Insert(CartLine),

    /// Add the line's quantity to the user's open line for the product, or
    /// insert the line if there is none.
    Upsert(CartLine),

    /// Set the quantity of an open line.
    SetQuantity {
        line_id: CartLineId,
        expected: u32,
        quantity: u32,
    },

    /// Delete an open line.
    Delete { line_id: CartLineId, expected: u32 },
}

/// A stock adjustment and a cart line mutation committed as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartChange {
    pub product_id: ProductId,
    /// Signed change to the product quantity. Negative reserves units and
    /// fails with `InsufficientStock` if the ledger cannot cover it.
    pub stock_delta: i64,
    pub line: LineMutation,
}

impl CartChange {
    /// Reserves `line.quantity` units and inserts the line.
    pub fn insert(line: CartLine) -> Self {
        Self {
            product_id: line.product_id,
            stock_delta: -i64::from(line.quantity),
            line: LineMutation::Insert(line),
        }
    }

    /// Reserves `line.quantity` units into the user's open line for the
    /// product, creating it from `line` if needed.
    pub fn upsert(line: CartLine) -> Self {
        Self {
            product_id: line.product_id,
            stock_delta: -i64::from(line.quantity),
            line: LineMutation::Upsert(line),
        }
    }

    /// Moves an open line from `expected` to `quantity` units, reserving or
    /// releasing the difference.
    pub fn resize(line: &CartLine, quantity: u32) -> Self {
        Self {
            product_id: line.product_id,
            stock_delta: i64::from(line.quantity) - i64::from(quantity),
            line: LineMutation::SetQuantity {
                line_id: line.id,
                expected: line.quantity,
                quantity,
            },
        }
    }

    /// Releases every unit held by an open line and deletes it.
    pub fn delete(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id,
            stock_delta: i64::from(line.quantity),
            line: LineMutation::Delete {
                line_id: line.id,
                expected: line.quantity,
            },
        }
    }
}

/// Result of a committed [`CartChange`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartChangeOutcome {
    /// The line after the change, `None` if it was deleted.
    pub line: Option<CartLine>,
    /// Ledger balance after the change, `None` if the product no longer
    /// exists (release against a deleted product).
    pub remaining_stock: Option<u32>,
}

/// An order paired with the quantity its cart line held when it was priced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedOrder {
    pub order: Order,
    /// A line that no longer holds this quantity fails the materialization
    /// with `Conflict`.
    pub line_quantity: u32,
}

impl PricedOrder {
    pub fn new(order: Order, line_quantity: u32) -> Self {
        Self {
            order,
            line_quantity,
        }
    }
}

/// Product listing filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    /// Restrict to these stores. Empty means every store.
    pub store_ids: Vec<StoreId>,
    pub available_only: bool,
    pub offset: u64,
    pub limit: Option<u64>,
}

impl ProductFilter {
    /// Every product owned by one store.
    pub fn for_store(store_id: StoreId) -> Self {
        Self {
            store_ids: vec![store_id],
            ..Self::default()
        }
    }
}

/// Field changes applied to a product. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductUpdate {
    pub product_name: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    pub price: Option<Money>,
    pub max_quantity: Option<u32>,
    /// Overwrites the ledger balance.
    pub quantity: Option<u32>,
    pub images: Option<Vec<String>>,
}

impl ProductUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Applies the changes to an in-memory product.
    pub fn apply_to(self, product: &mut Product) {
        if let Some(name) = self.product_name {
            product.product_name = name;
        }
        if let Some(description) = self.description {
            product.description = description;
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(max_quantity) = self.max_quantity {
            product.max_quantity = max_quantity;
        }
        if let Some(quantity) = self.quantity {
            product.quantity = quantity;
        }
        if let Some(images) = self.images {
            product.images = images;
        }
    }
}

/// One page of products plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub total: u64,
}

/// Payment outcome applied to a user's orders of one gateway transaction.
///
/// Only orders whose current status is a valid source for `status` (see
/// [`PaymentStatus::sources_for`]) are updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub gateway_order_id: String,
    /// Orders of other users sharing the id are left untouched.
    pub user_id: UserId,
    pub status: PaymentStatus,
    pub payment_id: Option<String>,
    pub signature: Option<String>,
}

/// Data recorded when a user requests a return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnRequest {
    pub reason: String,
    pub requested_at: DateTime<Utc>,
}

/// Compare-and-set on an order's fulfillment status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentTransition {
    pub order_id: OrderId,
    pub expected: FulfillmentStatus,
    pub next: FulfillmentStatus,
    pub return_request: Option<ReturnRequest>,
}

/// Core trait for commerce persistence.
///
/// Every method is a single atomic unit. Implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait CommerceStore: Send + Sync {
    // Stores

    async fn insert_store(&self, store: StoreRecord) -> Result<StoreRecord>;

    async fn get_store(&self, store_id: StoreId) -> Result<Option<StoreRecord>>;

    // Products

    async fn insert_product(&self, product: Product) -> Result<Product>;

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>>;

    /// Retrieves the products that exist among `ids`. Missing ids are skipped.
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Lists products matching the filter, oldest first.
    async fn list_products(&self, filter: ProductFilter) -> Result<ProductPage>;

    /// Flips `is_available` on a product owned by `store_id`.
    async fn toggle_product_availability(
        &self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<Product>;

    /// Applies field changes to a product owned by `store_id`.
    async fn update_product(
        &self,
        store_id: StoreId,
        product_id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product>;

    /// Deletes a product owned by `store_id`.
    async fn delete_product(&self, store_id: StoreId, product_id: ProductId) -> Result<()>;

    // Stock

    /// Decrements the product quantity by `units` if at least that many are
    /// available. Returns the new quantity.
    async fn reserve_stock(&self, product_id: ProductId, units: u32) -> Result<u32>;

    /// Increments the product quantity by `units`. Returns the new quantity.
    async fn release_stock(&self, product_id: ProductId, units: u32) -> Result<u32>;

    // Cart lines

    async fn get_cart_line(&self, line_id: CartLineId) -> Result<Option<CartLine>>;

    /// Retrieves the lines that exist among `ids`, ordered or not.
    async fn get_cart_lines(&self, ids: &[CartLineId]) -> Result<Vec<CartLine>>;

    /// Returns the open line for (user, product), if any.
    async fn open_cart_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<CartLine>>;

    /// Returns every open line of a user, oldest first.
    async fn open_cart_lines(&self, user_id: UserId) -> Result<Vec<CartLine>>;

    /// Applies a stock adjustment and a line mutation atomically.
    async fn apply_cart_change(&self, change: CartChange) -> Result<CartChangeOutcome>;

    // Orders

    /// Inserts the orders and flags each referenced cart line as ordered.
    ///
    /// Fails with `NotFound` if a referenced line is missing and with
    /// `Conflict` if one is already ordered or no longer holds the priced
    /// quantity. Nothing is written on failure.
    async fn materialize_orders(&self, orders: Vec<PricedOrder>) -> Result<Vec<Order>>;

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Orders of a user, oldest first.
    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Orders of a store, newest first.
    async fn orders_for_store(&self, store_id: StoreId) -> Result<Vec<Order>>;

    /// Every order, newest first.
    async fn all_orders(&self) -> Result<Vec<Order>>;

    /// Orders sharing one gateway transaction id, oldest first.
    async fn orders_for_transaction(&self, gateway_order_id: &str) -> Result<Vec<Order>>;

    /// Applies a payment outcome to every eligible order of a transaction
    /// owned by the settlement's user. Returns the number of orders updated.
    async fn settle_transaction(&self, settlement: Settlement) -> Result<u64>;

    /// Moves an order from `expected` to `next`.
    ///
    /// Fails with `NotFound` if the order does not exist and with `Conflict`
    /// if its status is no longer `expected`.
    async fn transition_fulfillment(&self, transition: FulfillmentTransition) -> Result<Order>;

    // Shipments

    /// Inserts the shipment and moves its order from `expected` to
    /// `Shipped` in one unit.
    ///
    /// Fails with `AlreadyExists` if the order already has a shipment.
    async fn create_shipment(
        &self,
        shipment: Shipment,
        expected: FulfillmentStatus,
    ) -> Result<Order>;

    async fn shipment_for_order(&self, order_id: OrderId) -> Result<Option<Shipment>>;

    // Likes

    /// Records a like. If the user already likes the product the existing
    /// like is returned unchanged.
    async fn insert_like(&self, like: Like) -> Result<Like>;

    /// Likes of a user, oldest first.
    async fn likes_for_user(&self, user_id: UserId) -> Result<Vec<Like>>;

    /// Removes the user's like on a product. Fails with `NotFound` if there
    /// is none.
    async fn delete_like(&self, user_id: UserId, product_id: ProductId) -> Result<Like>;
}
