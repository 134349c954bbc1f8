//! Persisted record shapes.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{
    CartLineId, FulfillmentStatus, LikeId, Money, OrderId, PaymentStatus, ProductId, ShipmentId,
    StoreId, UnknownStatus, UserId,
};
use serde::{Deserialize, Serialize};

/// Payment method recorded on every order created through the gateway.
pub const PAYMENT_METHOD_GATEWAY: &str = "RAZORPAY";

/// A store (tenant) that owns products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRecord {
    pub id: StoreId,
    pub store_name: String,
    pub created_at: DateTime<Utc>,
}

impl StoreRecord {
    pub fn new(store_name: impl Into<String>) -> Self {
        Self {
            id: StoreId::new(),
            store_name: store_name.into(),
            created_at: Utc::now(),
        }
    }
}

/// A catalog product. `quantity` is the live ledger balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub store_id: StoreId,
    pub product_name: String,
    pub description: Option<String>,
    pub price: Money,
    pub max_quantity: u32,
    pub quantity: u32,
    /// Opaque image paths owned by the file store.
    pub images: Vec<String>,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
}

/// A reserved-but-not-yet-ordered grouping of units for a (user, product) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Set in the same unit of work that creates the line's order.
    pub ordered: bool,
    pub created_at: DateTime<Utc>,
}

impl CartLine {
    /// Creates a new open line.
    pub fn open(user_id: UserId, product_id: ProductId, quantity: u32) -> Self {
        Self {
            id: CartLineId::new(),
            user_id,
            product_id,
            quantity,
            ordered: false,
            created_at: Utc::now(),
        }
    }
}

/// A user's like on a product. At most one per (user, product).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    pub id: LikeId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub liked_at: DateTime<Utc>,
}

impl Like {
    pub fn new(user_id: UserId, product_id: ProductId) -> Self {
        Self {
            id: LikeId::new(),
            user_id,
            product_id,
            liked_at: Utc::now(),
        }
    }
}

/// One order per cart line. Orders from the same checkout share
/// `gateway_order_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub store_id: StoreId,
    pub store_name: String,
    #[serde(rename = "cart_ids", with = "single_line")]
    pub cart_line_id: CartLineId,
    pub address: String,
    pub amount: Money,
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
    pub status: FulfillmentStatus,
    pub shipment_id: Option<ShipmentId>,
    pub return_reason: Option<String>,
    pub return_requested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Serializes the order's line reference as the one-element `cart_ids` list
/// clients expect.
mod single_line {
    use common::CartLineId;
    use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error};

    pub fn serialize<S: Serializer>(id: &CartLineId, serializer: S) -> Result<S::Ok, S::Error> {
        [id].serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<CartLineId, D::Error> {
        let ids = Vec::<CartLineId>::deserialize(deserializer)?;
        match ids.as_slice() {
            [id] => Ok(*id),
            other => Err(D::Error::invalid_length(other.len(), &"exactly one cart line id")),
        }
    }
}

/// Status recorded on a shipment.
///
/// Shipments are only created by booking a courier, so every record starts
/// out as `Shipped`. Later progress is tracked on the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShipmentStatus {
    Shipped,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Shipped => "Shipped",
        }
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ShipmentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Shipped" => Ok(ShipmentStatus::Shipped),
            other => Err(UnknownStatus {
                kind: "shipment",
                value: other.to_string(),
            }),
        }
    }
}

/// Shipment record, 1:1 with an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub order_id: OrderId,
    pub courier: String,
    pub tracking_number: String,
    pub status: ShipmentStatus,
    pub estimated_delivery: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
