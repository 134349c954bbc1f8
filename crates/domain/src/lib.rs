//! Domain layer for the commerce backend.
//!
//! This crate provides the services that sit on top of [`storage`]:
//! - [`InventoryLedger`] for per-product stock
//! - [`CartService`] for reservations into cart lines
//! - [`CatalogService`] for store-owned products and the public listing
//! - [`LikeService`] for per-user likes
//! - [`StoreOrderService`] for the fulfillment lifecycle
//! - [`OrderHistory`] for order views

pub mod cart;
pub mod catalog;
pub mod error;
pub mod history;
pub mod inventory;
pub mod likes;
pub mod lifecycle;

pub use cart::{CartItem, CartService, CartView, MAX_CONFLICT_RETRIES, SyncOutcome};
pub use catalog::{
    CatalogService, MAX_PRICE, NewProduct, ProductListing, ProductPatch, ProductQuery,
};
pub use error::{DomainError, Result};
pub use history::{OrderDetail, OrderHistory};
pub use inventory::InventoryLedger;
pub use lifecycle::{DEFAULT_RETURN_REASON, StoreOrderService};
pub use likes::{LikeOutcome, LikeService, LikedProduct};
