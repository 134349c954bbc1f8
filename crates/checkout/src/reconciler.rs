//! Payment reconciliation for gateway callbacks.

use common::{PaymentStatus, UserId};
use serde::Deserialize;
use storage::{CommerceStore, Order, Settlement};

use crate::error::{CheckoutError, Result};
use crate::signature::SignatureVerifier;

/// Callback payload sent by the client after a gateway checkout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentConfirmation {
    #[serde(rename = "razorpay_order_id")]
    pub gateway_order_id: String,
    #[serde(rename = "razorpay_payment_id")]
    pub gateway_payment_id: String,
    #[serde(rename = "razorpay_signature")]
    pub signature: String,
}

/// Settles the caller's orders that share a gateway transaction.
///
/// A verification attempt never leaves an order of the transaction in
/// `Pending`: mismatches and storage failures both settle it as `Failed`.
/// Orders of other users are invisible to every operation here.
pub struct PaymentReconciler<S: CommerceStore> {
    store: S,
    verifier: SignatureVerifier,
}

impl<S: CommerceStore> PaymentReconciler<S> {
    pub fn new(store: S, verifier: SignatureVerifier) -> Self {
        Self { store, verifier }
    }

    /// Verifies the callback signature and settles the transaction.
    ///
    /// Returns the transaction's orders after settlement.
    #[tracing::instrument(skip(self, confirmation), fields(gateway_order_id = %confirmation.gateway_order_id))]
    pub async fn verify_payment(
        &self,
        user_id: UserId,
        confirmation: PaymentConfirmation,
    ) -> Result<Vec<Order>> {
        let PaymentConfirmation {
            gateway_order_id,
            gateway_payment_id,
            signature,
        } = confirmation;

        let orders = self.own_orders(user_id, &gateway_order_id).await?;
        if orders.is_empty() {
            metrics::counter!("payment_verifications_total", "outcome" => "not_found").increment(1);
            return Err(CheckoutError::OrdersNotFound(gateway_order_id));
        }

        if !self
            .verifier
            .verify(&gateway_order_id, &gateway_payment_id, &signature)
        {
            let failed = self.mark_failed(user_id, &gateway_order_id).await?;
            metrics::counter!("payment_verifications_total", "outcome" => "mismatch").increment(1);
            tracing::warn!(failed, "Payment signature mismatch");
            return Err(CheckoutError::VerificationFailed);
        }

        let settlement = Settlement {
            gateway_order_id: gateway_order_id.clone(),
            user_id,
            status: PaymentStatus::Completed,
            payment_id: Some(gateway_payment_id),
            signature: Some(signature),
        };
        let completed = match self.store.settle_transaction(settlement).await {
            Ok(completed) => completed,
            Err(e) => {
                tracing::error!(error = %e, "Settling payment failed, marking orders failed");
                if let Err(fallback) = self.mark_failed(user_id, &gateway_order_id).await {
                    tracing::error!(error = %fallback, "Could not mark orders failed");
                }
                metrics::counter!("payment_verifications_total", "outcome" => "error").increment(1);
                return Err(e.into());
            }
        };

        metrics::counter!("payment_verifications_total", "outcome" => "verified").increment(1);
        tracing::info!(completed, "Payment verified");
        self.own_orders(user_id, &gateway_order_id).await
    }

    /// Records a client-reported payment failure for every pending order
    /// the user holds in the transaction. Returns how many orders changed.
    #[tracing::instrument(skip(self))]
    pub async fn handle_payment_failure(
        &self,
        user_id: UserId,
        gateway_order_id: &str,
    ) -> Result<u64> {
        let failed = self.mark_failed(user_id, gateway_order_id).await?;
        tracing::info!(failed, "Payment failure recorded");
        Ok(failed)
    }

    async fn own_orders(&self, user_id: UserId, gateway_order_id: &str) -> Result<Vec<Order>> {
        let mut orders = self.store.orders_for_transaction(gateway_order_id).await?;
        orders.retain(|o| o.user_id == user_id);
        Ok(orders)
    }

    async fn mark_failed(&self, user_id: UserId, gateway_order_id: &str) -> Result<u64> {
        Ok(self
            .store
            .settle_transaction(Settlement {
                gateway_order_id: gateway_order_id.to_string(),
                user_id,
                status: PaymentStatus::Failed,
                payment_id: None,
                signature: None,
            })
            .await?)
    }
}
