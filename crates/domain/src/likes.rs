//! Per-user likes (wishlist) on catalog products.

use std::collections::HashMap;

use common::{ProductId, StoreId, UserId};
use serde::Serialize;
use storage::{CommerceStore, Like, Product, StoreRecord};

use crate::error::{DomainError, Result};

/// Result of [`LikeService::add_like`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeOutcome {
    pub like: Like,
    /// `false` if the user already liked the product.
    pub created: bool,
}

/// A like joined with its product and the owning store's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LikedProduct {
    #[serde(flatten)]
    pub like: Like,
    pub product: Product,
    /// `None` if the store record is gone.
    pub store_name: Option<String>,
}

pub struct LikeService<S: CommerceStore> {
    store: S,
}

impl<S: CommerceStore> LikeService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Likes a product. Liking it again returns the existing like.
    #[tracing::instrument(skip(self))]
    pub async fn add_like(&self, user_id: UserId, product_id: ProductId) -> Result<LikeOutcome> {
        if self.store.get_product(product_id).await?.is_none() {
            return Err(DomainError::not_found("product", product_id));
        }

        let candidate = Like::new(user_id, product_id);
        let like = self.store.insert_like(candidate.clone()).await?;
        let created = like.id == candidate.id;
        if created {
            metrics::counter!("likes_added_total").increment(1);
            tracing::info!(like_id = %like.id, "Liked product");
        }
        Ok(LikeOutcome { like, created })
    }

    /// A user's likes, oldest first. Likes on deleted products are skipped.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_likes(&self, user_id: UserId) -> Result<Vec<LikedProduct>> {
        let likes = self.store.likes_for_user(user_id).await?;

        let product_ids: Vec<ProductId> = likes.iter().map(|l| l.product_id).collect();
        let products: HashMap<ProductId, Product> = self
            .store
            .get_products(&product_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut stores: HashMap<StoreId, Option<StoreRecord>> = HashMap::new();
        for product in products.values() {
            if !stores.contains_key(&product.store_id) {
                let record = self.store.get_store(product.store_id).await?;
                stores.insert(product.store_id, record);
            }
        }

        Ok(likes
            .into_iter()
            .filter_map(|like| {
                let product = products.get(&like.product_id)?.clone();
                let store_name = stores
                    .get(&product.store_id)
                    .and_then(|r| r.as_ref())
                    .map(|r| r.store_name.clone());
                Some(LikedProduct {
                    like,
                    product,
                    store_name,
                })
            })
            .collect())
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_like(&self, user_id: UserId, product_id: ProductId) -> Result<Like> {
        let like = self.store.delete_like(user_id, product_id).await?;
        tracing::info!(like_id = %like.id, "Removed like");
        Ok(like)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::Money;
    use storage::InMemoryStore;

    use super::*;

    async fn seeded() -> (InMemoryStore, StoreRecord, Product) {
        let store = InMemoryStore::new();
        let record = store.insert_store(StoreRecord::new("Lights")).await.unwrap();
        let product = store
            .insert_product(Product {
                id: ProductId::new(),
                store_id: record.id,
                product_name: "Lamp".to_string(),
                description: None,
                price: Money::from_major_units(40),
                max_quantity: 2,
                quantity: 2,
                images: vec!["lamp.png".to_string()],
                is_available: true,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        (store, record, product)
    }

    #[tokio::test]
    async fn like_twice_keeps_one() {
        let (store, _, product) = seeded().await;
        let likes = LikeService::new(store);
        let user = UserId::new();

        let first = likes.add_like(user, product.id).await.unwrap();
        assert!(first.created);
        let again = likes.add_like(user, product.id).await.unwrap();
        assert!(!again.created);
        assert_eq!(again.like.id, first.like.id);
        assert_eq!(likes.fetch_likes(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn like_unknown_product_is_not_found() {
        let likes = LikeService::new(InMemoryStore::new());
        let result = likes.add_like(UserId::new(), ProductId::new()).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn fetch_joins_store_and_skips_deleted_products() {
        let (store, record, product) = seeded().await;
        let likes = LikeService::new(store.clone());
        let user = UserId::new();

        let gone = store
            .insert_product(Product {
                id: ProductId::new(),
                ..product.clone()
            })
            .await
            .unwrap();
        likes.add_like(user, product.id).await.unwrap();
        likes.add_like(user, gone.id).await.unwrap();
        store.delete_product(record.id, gone.id).await.unwrap();

        let liked = likes.fetch_likes(user).await.unwrap();
        assert_eq!(liked.len(), 1);
        assert_eq!(liked[0].product.id, product.id);
        assert_eq!(liked[0].store_name.as_deref(), Some("Lights"));

        let json = serde_json::to_value(&liked[0]).unwrap();
        assert_eq!(json["store_name"], "Lights");
        assert_eq!(json["product"]["product_name"], "Lamp");
    }

    #[tokio::test]
    async fn remove_missing_like_is_not_found() {
        let (store, _, product) = seeded().await;
        let likes = LikeService::new(store);
        let user = UserId::new();

        likes.add_like(user, product.id).await.unwrap();
        likes.remove_like(user, product.id).await.unwrap();
        let result = likes.remove_like(user, product.id).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
        assert!(likes.fetch_likes(user).await.unwrap().is_empty());
    }
}
