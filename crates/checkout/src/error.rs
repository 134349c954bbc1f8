//! Checkout error types.

use common::OrderId;
use domain::DomainError;
use storage::StorageError;
use thiserror::Error;

/// Errors that can occur during checkout, payment and shipping.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The user has no open cart line with a resolvable product.
    #[error("No new cart items to order")]
    NoItemsToOrder,

    /// No order references the gateway transaction.
    #[error("No orders found for gateway order {0}")]
    OrdersNotFound(String),

    /// The callback signature does not match the transaction.
    #[error("Payment signature verification failed")]
    VerificationFailed,

    /// The payment gateway failed or did not answer in time.
    #[error("Payment gateway unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The order already has a shipment.
    #[error("Order {0} has already been shipped")]
    AlreadyShipped(OrderId),

    /// The request is malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Domain error.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<StorageError> for CheckoutError {
    fn from(e: StorageError) -> Self {
        CheckoutError::Domain(e.into())
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
