//! Shared types for the commerce backend.
//!
//! Everything here is plain data used by both the storage layer and the
//! services built on top of it: typed identifiers, [`Money`], and the
//! payment and fulfillment status enums together with their transition rules.

pub mod money;
pub mod status;
pub mod types;

pub use money::{Money, MoneyError};
pub use status::{FulfillmentStatus, PaymentStatus, UnknownStatus};
pub use types::{
    AdminId, CartLineId, LikeId, OrderId, ProductId, ShipmentId, StoreId, UserId,
};
