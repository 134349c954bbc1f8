//! Persistence layer for the commerce backend.
//!
//! [`CommerceStore`] is the single seam between the services and the
//! database. Every method that touches stock is one atomic unit: stock
//! predicates, cart line preconditions and order inserts either all commit
//! or none do. Two backends are provided: [`InMemoryStore`] for tests and
//! local runs, and [`PostgresStore`] for production.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use error::{Result, StorageError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use records::{
    CartLine, Like, Order, PAYMENT_METHOD_GATEWAY, Product, Shipment, ShipmentStatus,
    StoreRecord,
};
pub use store::{
    CartChange, CartChangeOutcome, CommerceStore, FulfillmentTransition, LineMutation,
    PricedOrder, ProductFilter, ProductPage, ProductUpdate, ReturnRequest, Settlement,
};
