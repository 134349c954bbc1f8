//! Per-product stock ledger.

use common::ProductId;
use storage::CommerceStore;

use crate::error::{DomainError, Result};

/// Owns the available quantity of every product.
///
/// The product row is the single source of stock truth. Cart operations
/// pair their stock delta with a line mutation in one storage unit (see
/// [`crate::CartService`]) and hand the resulting balance back to the
/// ledger for auditing.
pub struct InventoryLedger<S: CommerceStore> {
    store: S,
}

impl<S: CommerceStore> InventoryLedger<S> {
    /// Creates a new ledger over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Atomically takes `units` from the product. Returns the new quantity.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(&self, product_id: ProductId, units: u32) -> Result<u32> {
        match self.store.reserve_stock(product_id, units).await {
            Ok(remaining) => Ok(remaining),
            Err(e) => Err(match DomainError::from(e) {
                DomainError::InsufficientStock { product_id, .. } => {
                    DomainError::OutOfStock { product_id }
                }
                other => other,
            }),
        }
    }

    /// Atomically returns `units` to the product. Returns the new quantity.
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, product_id: ProductId, units: u32) -> Result<u32> {
        let quantity = self.store.release_stock(product_id, units).await?;
        self.audit_release(product_id, quantity).await;
        Ok(quantity)
    }

    /// Checks a balance left behind by a committed release.
    ///
    /// The balance is not clamped to `max_quantity`; exceeding it is logged
    /// and counted. Returns true in that case.
    pub async fn audit_release(&self, product_id: ProductId, balance: u32) -> bool {
        match self.store.get_product(product_id).await {
            Ok(Some(product)) if balance > product.max_quantity => {
                metrics::counter!("stock_above_max_total").increment(1);
                tracing::warn!(
                    product_id = %product_id,
                    quantity = balance,
                    max_quantity = product.max_quantity,
                    "Released stock exceeds max quantity"
                );
                true
            }
            Ok(_) => false,
            Err(e) => {
                tracing::warn!(
                    product_id = %product_id,
                    error = %e,
                    "Could not audit released stock"
                );
                false
            }
        }
    }

    /// Returns the current available quantity.
    pub async fn available(&self, product_id: ProductId) -> Result<u32> {
        self.store
            .get_product(product_id)
            .await?
            .map(|p| p.quantity)
            .ok_or_else(|| DomainError::not_found("product", product_id))
    }
}
