//! Store order lifecycle.
//!
//! Stores move their orders through the fulfillment graph defined by
//! [`FulfillmentStatus::can_transition_to`]; customers may only request a
//! return once an order is delivered. Every write is a compare-and-set on
//! the status that was checked, so a concurrent change surfaces as
//! [`DomainError::Conflict`] instead of silently overwriting it.

use chrono::Utc;
use common::{FulfillmentStatus, OrderId, StoreId, UserId};
use storage::{CommerceStore, FulfillmentTransition, Order, ReturnRequest};

use crate::error::{DomainError, Result};

/// Reason recorded when a customer does not give one.
pub const DEFAULT_RETURN_REASON: &str = "Not specified";

pub struct StoreOrderService<S: CommerceStore> {
    store: S,
}

impl<S: CommerceStore> StoreOrderService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Orders placed with a store, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_store_orders(&self, store_id: StoreId) -> Result<Vec<Order>> {
        Ok(self.store.orders_for_store(store_id).await?)
    }

    /// Moves a store's order to `target`.
    ///
    /// `Return Initiated` is customer-driven and cannot be set here.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        store_id: StoreId,
        order_id: OrderId,
        target: FulfillmentStatus,
    ) -> Result<Order> {
        if target == FulfillmentStatus::ReturnInitiated {
            return Err(DomainError::Validation(
                "returns are requested by the customer".to_string(),
            ));
        }

        let order = self
            .store
            .get_order(order_id)
            .await?
            .filter(|o| o.store_id == store_id)
            .ok_or_else(|| DomainError::not_found("order", order_id))?;

        self.transition(order, target, None).await
    }

    /// Records a customer's return request on a delivered order.
    #[tracing::instrument(skip(self))]
    pub async fn initiate_return(
        &self,
        user_id: UserId,
        order_id: OrderId,
        reason: Option<String>,
    ) -> Result<Order> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| DomainError::not_found("order", order_id))?;

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_RETURN_REASON.to_string());

        let request = ReturnRequest {
            reason,
            requested_at: Utc::now(),
        };
        self.transition(order, FulfillmentStatus::ReturnInitiated, Some(request))
            .await
    }

    async fn transition(
        &self,
        order: Order,
        target: FulfillmentStatus,
        return_request: Option<ReturnRequest>,
    ) -> Result<Order> {
        if !order.status.can_transition_to(target) {
            return Err(DomainError::InvalidTransition {
                from: order.status,
                to: target,
            });
        }

        let updated = self
            .store
            .transition_fulfillment(FulfillmentTransition {
                order_id: order.id,
                expected: order.status,
                next: target,
                return_request,
            })
            .await?;

        tracing::info!(
            order_id = %order.id,
            from = %order.status,
            to = %target,
            "Order status changed"
        );
        Ok(updated)
    }
}
