//! Store-owned product catalog and public listing.

use chrono::Utc;
use common::{Money, ProductId, StoreId};
use serde::{Deserialize, Serialize};
use storage::{CommerceStore, Product, ProductFilter, ProductUpdate, StoreRecord};

use crate::error::{DomainError, Result};

/// Page used when the caller does not ask for one.
pub const DEFAULT_PAGE: u64 = 1;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Highest unit price a product may carry (10,000,000.00).
pub const MAX_PRICE: Money = Money::from_minor(1_000_000_000);

/// Fields a store supplies when listing a new product.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewProduct {
    pub product_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Money,
    pub max_quantity: u32,
    /// Starting stock. Defaults to `max_quantity`.
    #[serde(default)]
    pub quantity: Option<u32>,
    pub images: Vec<String>,
}

/// Field changes a store applies to one of its products. Omitted fields
/// are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProductPatch {
    #[serde(default)]
    pub product_name: Option<String>,
    /// A blank description clears it.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<Money>,
    #[serde(default)]
    pub max_quantity: Option<u32>,
    /// Sets the available balance outright. Omit it to keep the live
    /// balance, including units currently held in carts.
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
}

fn check_price(price: Money) -> Result<()> {
    if price.is_negative() {
        return Err(DomainError::Validation("price must not be negative".to_string()));
    }
    if price > MAX_PRICE {
        return Err(DomainError::Validation(format!(
            "price must not exceed {}",
            MAX_PRICE.as_major()
        )));
    }
    Ok(())
}

/// Public listing request. Zero or missing values fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub store_ids: Vec<StoreId>,
}

/// One page of the public listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductListing {
    pub products: Vec<Product>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

pub struct CatalogService<S: CommerceStore> {
    store: S,
}

impl<S: CommerceStore> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn register_store(&self, store_name: &str) -> Result<StoreRecord> {
        let store_name = store_name.trim();
        if store_name.is_empty() {
            return Err(DomainError::Validation("store name is required".to_string()));
        }
        let record = self.store.insert_store(StoreRecord::new(store_name)).await?;
        tracing::info!(store_id = %record.id, "Registered store");
        Ok(record)
    }

    #[tracing::instrument(skip(self, new), fields(product_name = %new.product_name))]
    pub async fn add_product(&self, store_id: StoreId, new: NewProduct) -> Result<Product> {
        if new.product_name.trim().is_empty() {
            return Err(DomainError::Validation("product name is required".to_string()));
        }
        check_price(new.price)?;
        if new.images.is_empty() {
            return Err(DomainError::Validation(
                "at least one image is required".to_string(),
            ));
        }
        if self.store.get_store(store_id).await?.is_none() {
            return Err(DomainError::not_found("store", store_id));
        }

        let product = Product {
            id: ProductId::new(),
            store_id,
            product_name: new.product_name.trim().to_string(),
            description: new.description,
            price: new.price,
            max_quantity: new.max_quantity,
            quantity: new.quantity.unwrap_or(new.max_quantity),
            images: new.images,
            is_available: true,
            created_at: Utc::now(),
        };
        let product = self.store.insert_product(product).await?;
        tracing::info!(product_id = %product.id, quantity = product.quantity, "Added product");
        Ok(product)
    }

    pub async fn store_products(&self, store_id: StoreId) -> Result<Vec<Product>> {
        let page = self
            .store
            .list_products(ProductFilter::for_store(store_id))
            .await?;
        Ok(page.products)
    }

    #[tracing::instrument(skip(self))]
    pub async fn toggle_availability(
        &self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<Product> {
        Ok(self
            .store
            .toggle_product_availability(store_id, product_id)
            .await?)
    }

    /// Applies a patch to a product owned by `store_id`.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_product(
        &self,
        store_id: StoreId,
        product_id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product> {
        if patch == ProductPatch::default() {
            return Err(DomainError::Validation("nothing to update".to_string()));
        }
        let product_name = match patch.product_name {
            Some(name) if name.trim().is_empty() => {
                return Err(DomainError::Validation("product name is required".to_string()));
            }
            name => name.map(|n| n.trim().to_string()),
        };
        if let Some(price) = patch.price {
            check_price(price)?;
        }
        if patch.images.as_ref().is_some_and(Vec::is_empty) {
            return Err(DomainError::Validation(
                "at least one image is required".to_string(),
            ));
        }

        let current = self
            .store
            .get_product(product_id)
            .await?
            .filter(|p| p.store_id == store_id)
            .ok_or_else(|| DomainError::not_found("product", product_id))?;
        let max_quantity = patch.max_quantity.unwrap_or(current.max_quantity);
        if let Some(quantity) = patch.quantity
            && quantity > max_quantity
        {
            return Err(DomainError::Validation(format!(
                "quantity {quantity} exceeds max quantity {max_quantity}"
            )));
        }

        let update = ProductUpdate {
            product_name,
            description: patch
                .description
                .map(|d| Some(d.trim().to_string()).filter(|d| !d.is_empty())),
            price: patch.price,
            max_quantity: patch.max_quantity,
            quantity: patch.quantity,
            images: patch.images,
        };
        let product = self
            .store
            .update_product(store_id, product_id, update)
            .await?;
        if product.quantity > product.max_quantity {
            tracing::warn!(
                product_id = %product.id,
                quantity = product.quantity,
                max_quantity = product.max_quantity,
                "Stock above max quantity after update"
            );
        }
        tracing::info!(product_id = %product.id, "Updated product");
        Ok(product)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, store_id: StoreId, product_id: ProductId) -> Result<()> {
        self.store.delete_product(store_id, product_id).await?;
        tracing::info!(product_id = %product_id, "Deleted product");
        Ok(())
    }

    /// Lists available products, paginated.
    pub async fn public_products(&self, query: ProductQuery) -> Result<ProductListing> {
        let page = query.page.filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE);
        let limit = query.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_PAGE_SIZE);

        let result = self
            .store
            .list_products(ProductFilter {
                store_ids: query.store_ids,
                available_only: true,
                offset: (page - 1).saturating_mul(limit),
                limit: Some(limit),
            })
            .await?;

        Ok(ProductListing {
            products: result.products,
            total: result.total,
            page,
            limit,
            total_pages: result.total.div_ceil(limit),
        })
    }

    pub async fn product(&self, product_id: ProductId) -> Result<Product> {
        self.store
            .get_product(product_id)
            .await?
            .ok_or_else(|| DomainError::not_found("product", product_id))
    }
}

#[cfg(test)]
mod tests {
    use storage::InMemoryStore;

    use super::*;

    fn lamp(images: Vec<String>) -> NewProduct {
        NewProduct {
            product_name: "Lamp".to_string(),
            description: Some("Brass".to_string()),
            price: Money::from_major_units(40),
            max_quantity: 8,
            quantity: None,
            images,
        }
    }

    #[tokio::test]
    async fn quantity_defaults_to_max() {
        let catalog = CatalogService::new(InMemoryStore::new());
        let record = catalog.register_store("Lights").await.unwrap();

        let product = catalog
            .add_product(record.id, lamp(vec!["lamp.png".to_string()]))
            .await
            .unwrap();
        assert_eq!(product.quantity, 8);
        assert!(product.is_available);
    }

    #[tokio::test]
    async fn product_requires_an_image() {
        let catalog = CatalogService::new(InMemoryStore::new());
        let record = catalog.register_store("Lights").await.unwrap();

        let result = catalog.add_product(record.id, lamp(vec![])).await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn product_requires_known_store() {
        let catalog = CatalogService::new(InMemoryStore::new());
        let result = catalog
            .add_product(StoreId::new(), lamp(vec!["lamp.png".to_string()]))
            .await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn blank_store_name_rejected() {
        let catalog = CatalogService::new(InMemoryStore::new());
        assert!(catalog.register_store("   ").await.is_err());
    }

    #[tokio::test]
    async fn public_listing_hides_unavailable_and_counts_pages() {
        let catalog = CatalogService::new(InMemoryStore::new());
        let record = catalog.register_store("Lights").await.unwrap();
        let mut ids = Vec::new();
        for _ in 0..12 {
            let product = catalog
                .add_product(record.id, lamp(vec!["lamp.png".to_string()]))
                .await
                .unwrap();
            ids.push(product.id);
        }
        catalog.toggle_availability(record.id, ids[0]).await.unwrap();

        let first = catalog.public_products(ProductQuery::default()).await.unwrap();
        assert_eq!(first.total, 11);
        assert_eq!(first.products.len(), 10);
        assert_eq!(first.total_pages, 2);

        let second = catalog
            .public_products(ProductQuery {
                page: Some(2),
                limit: Some(0),
                store_ids: vec![record.id],
            })
            .await
            .unwrap();
        assert_eq!(second.page, 2);
        assert_eq!(second.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(second.products.len(), 1);

        let own = catalog.store_products(record.id).await.unwrap();
        assert_eq!(own.len(), 12);
    }

    #[tokio::test]
    async fn price_above_ceiling_rejected() {
        let catalog = CatalogService::new(InMemoryStore::new());
        let record = catalog.register_store("Lights").await.unwrap();

        let mut new = lamp(vec!["lamp.png".to_string()]);
        new.price = Money::from_minor(MAX_PRICE.minor() + 1);
        let result = catalog.add_product(record.id, new).await;
        assert!(matches!(result, Err(DomainError::Validation(_))));

        let mut new = lamp(vec!["lamp.png".to_string()]);
        new.price = MAX_PRICE;
        assert!(catalog.add_product(record.id, new).await.is_ok());
    }

    #[tokio::test]
    async fn update_keeps_live_stock_unless_restocked() {
        let store = InMemoryStore::new();
        let catalog = CatalogService::new(store.clone());
        let record = catalog.register_store("Lights").await.unwrap();
        let product = catalog
            .add_product(record.id, lamp(vec!["lamp.png".to_string()]))
            .await
            .unwrap();
        store.reserve_stock(product.id, 3).await.unwrap();

        let repriced = catalog
            .update_product(
                record.id,
                product.id,
                ProductPatch {
                    product_name: Some("  Desk lamp ".to_string()),
                    description: Some(" ".to_string()),
                    price: Some(Money::from_major_units(45)),
                    ..ProductPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(repriced.product_name, "Desk lamp");
        assert_eq!(repriced.description, None);
        assert_eq!(repriced.price, Money::from_major_units(45));
        assert_eq!(repriced.quantity, 5);

        let restocked = catalog
            .update_product(
                record.id,
                product.id,
                ProductPatch {
                    max_quantity: Some(12),
                    quantity: Some(12),
                    ..ProductPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(restocked.max_quantity, 12);
        assert_eq!(restocked.quantity, 12);
    }

    #[tokio::test]
    async fn invalid_updates_rejected() {
        let catalog = CatalogService::new(InMemoryStore::new());
        let record = catalog.register_store("Lights").await.unwrap();
        let product = catalog
            .add_product(record.id, lamp(vec!["lamp.png".to_string()]))
            .await
            .unwrap();

        let invalid = [
            ProductPatch::default(),
            ProductPatch {
                product_name: Some(" ".to_string()),
                ..ProductPatch::default()
            },
            ProductPatch {
                price: Some(Money::from_minor(-1)),
                ..ProductPatch::default()
            },
            ProductPatch {
                images: Some(vec![]),
                ..ProductPatch::default()
            },
            ProductPatch {
                quantity: Some(9),
                ..ProductPatch::default()
            },
        ];
        for patch in invalid {
            let result = catalog.update_product(record.id, product.id, patch).await;
            assert!(matches!(result, Err(DomainError::Validation(_))));
        }

        let result = catalog
            .update_product(
                StoreId::new(),
                product.id,
                ProductPatch {
                    price: Some(Money::from_major_units(1)),
                    ..ProductPatch::default()
                },
            )
            .await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));

        let unchanged = catalog.product(product.id).await.unwrap();
        assert_eq!(unchanged, product);
    }
}
