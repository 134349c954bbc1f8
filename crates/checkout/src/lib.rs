//! Checkout flow for the commerce backend.
//!
//! This crate turns open carts into orders and settles them:
//! - [`OrderMaterializer`] creates one order per open cart line under a
//!   shared gateway transaction
//! - [`PaymentReconciler`] verifies gateway callbacks and settles every
//!   order of a transaction together
//! - [`ShippingService`] books a shipment through a [`Courier`]
//!
//! The payment gateway sits behind [`PaymentGateway`], with an in-memory
//! implementation for tests and a Razorpay REST client.

pub mod error;
pub mod gateway;
pub mod materializer;
pub mod reconciler;
pub mod shipping;
pub mod signature;

pub use error::{CheckoutError, Result};
pub use gateway::{
    GatewayTransaction, InMemoryPaymentGateway, PaymentGateway, RazorpayConfig, RazorpayGateway,
};
pub use materializer::{CheckoutReceipt, OrderMaterializer, UNKNOWN_STORE_NAME};
pub use reconciler::{PaymentConfirmation, PaymentReconciler};
pub use shipping::{Courier, MOCK_COURIER_NAME, MockCourier, ShippedOrder, ShippingService};
pub use signature::SignatureVerifier;
