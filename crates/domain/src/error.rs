//! Domain error types.

use common::{FulfillmentStatus, MoneyError, ProductId};
use storage::StorageError;
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The referenced record does not exist or is not visible to the caller.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// No unit of the product is left to reserve.
    #[error("Product {product_id} is out of stock")]
    OutOfStock { product_id: ProductId },

    /// A quantity increase exceeds the remaining stock.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The order lifecycle does not allow this transition.
    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition {
        from: FulfillmentStatus,
        to: FulfillmentStatus,
    },

    /// The record was changed concurrently.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The request is malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A price or total does not fit in the money representation.
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// An error occurred in the store.
    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl DomainError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<StorageError> for DomainError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound { entity, id } => DomainError::NotFound { entity, id },
            StorageError::InsufficientStock {
                product_id,
                requested,
                available,
            } => DomainError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            StorageError::Conflict(msg) => DomainError::Conflict(msg),
            other => DomainError::Storage(other),
        }
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
