//! Public catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::{ProductId, StoreId};
use domain::{ProductListing, ProductQuery};
use serde::Deserialize;
use storage::{CommerceStore, Product};

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

/// Query string for the public listing. `store_ids` is comma separated.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub store_ids: Option<String>,
}

impl ListParams {
    fn into_query(self) -> Result<ProductQuery, ApiError> {
        let store_ids = self
            .store_ids
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_id::<StoreId>)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ProductQuery {
            page: self.page,
            limit: self.limit,
            store_ids,
        })
    }
}

/// GET /products: available products, paginated.
#[tracing::instrument(skip(state))]
pub async fn list<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<ListParams>,
) -> Result<Json<ProductListing>, ApiError> {
    let query = params.into_query()?;
    Ok(Json(state.catalog.public_products(query).await?))
}

/// GET /products/:id: a single product.
#[tracing::instrument(skip(state))]
pub async fn get<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let product_id: ProductId = parse_id(&id)?;
    Ok(Json(state.catalog.product(product_id).await?))
}
