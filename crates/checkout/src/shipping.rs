//! Shipping: one mock shipment per order.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use common::{FulfillmentStatus, OrderId, ShipmentId, StoreId, UserId};
use domain::DomainError;
use rand::Rng;
use serde::Serialize;
use storage::{CommerceStore, Order, Shipment, ShipmentStatus, StorageError};

use crate::error::{CheckoutError, Result};

/// Courier name recorded by [`MockCourier`].
pub const MOCK_COURIER_NAME: &str = "MockCourier";

/// Trait for courier bookings.
#[async_trait]
pub trait Courier: Send + Sync {
    /// Books a pickup for the order and returns the shipment to record.
    async fn book(&self, order: &Order) -> Result<Shipment>;
}

/// Courier that books instantly with a random tracking number and a five
/// day delivery estimate.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockCourier;

#[async_trait]
impl Courier for MockCourier {
    async fn book(&self, order: &Order) -> Result<Shipment> {
        let tracking: u32 = rand::thread_rng().gen_range(0..1_000_000);
        let now = Utc::now();
        Ok(Shipment {
            id: ShipmentId::new(),
            order_id: order.id,
            courier: MOCK_COURIER_NAME.to_string(),
            tracking_number: format!("TRK{tracking}"),
            status: ShipmentStatus::Shipped,
            estimated_delivery: now + Duration::days(5),
            created_at: now,
        })
    }
}

/// A shipped order together with its shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShippedOrder {
    pub order: Order,
    pub shipment: Shipment,
}

/// Service for store shipping operations.
pub struct ShippingService<S: CommerceStore, C: Courier> {
    store: S,
    courier: C,
}

impl<S: CommerceStore, C: Courier> ShippingService<S, C> {
    pub fn new(store: S, courier: C) -> Self {
        Self { store, courier }
    }

    /// Hands a store's order to the courier and marks it `Shipped`.
    #[tracing::instrument(skip(self))]
    pub async fn ship_order(&self, store_id: StoreId, order_id: OrderId) -> Result<ShippedOrder> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .filter(|o| o.store_id == store_id)
            .ok_or_else(|| order_not_found(order_id))?;

        if order.shipment_id.is_some() || self.store.shipment_for_order(order_id).await?.is_some()
        {
            return Err(CheckoutError::AlreadyShipped(order_id));
        }
        if !order.status.can_transition_to(FulfillmentStatus::Shipped) {
            return Err(DomainError::InvalidTransition {
                from: order.status,
                to: FulfillmentStatus::Shipped,
            }
            .into());
        }

        let shipment = self.courier.book(&order).await?;
        let order = match self.store.create_shipment(shipment.clone(), order.status).await {
            Ok(order) => order,
            Err(StorageError::AlreadyExists { .. }) => {
                return Err(CheckoutError::AlreadyShipped(order_id));
            }
            Err(e) => return Err(e.into()),
        };

        metrics::counter!("shipments_created_total").increment(1);
        tracing::info!(
            order_id = %order_id,
            tracking_number = %shipment.tracking_number,
            "Order shipped"
        );
        Ok(ShippedOrder { order, shipment })
    }

    /// Returns the shipment of one of the user's orders.
    #[tracing::instrument(skip(self))]
    pub async fn shipment_for_order(&self, user_id: UserId, order_id: OrderId) -> Result<Shipment> {
        self.store
            .get_order(order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| order_not_found(order_id))?;

        self.store
            .shipment_for_order(order_id)
            .await?
            .ok_or_else(|| {
                DomainError::NotFound {
                    entity: "shipment",
                    id: order_id.to_string(),
                }
                .into()
            })
    }
}

fn order_not_found(order_id: OrderId) -> CheckoutError {
    DomainError::NotFound {
        entity: "order",
        id: order_id.to_string(),
    }
    .into()
}
