//! Store-facing endpoints: registration, products and order management.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{FulfillmentStatus, OrderId, ProductId};
use domain::{NewProduct, ProductPatch};
use serde::Deserialize;
use storage::{CommerceStore, Order, Product, StoreRecord};

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;
use crate::principal::StorePrincipal;

#[derive(Deserialize)]
pub struct RegisterStoreRequest {
    pub store_name: String,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: FulfillmentStatus,
}

/// POST /stores: register a store.
#[tracing::instrument(skip(state, req))]
pub async fn register<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<RegisterStoreRequest>,
) -> Result<(StatusCode, Json<StoreRecord>), ApiError> {
    let record = state.catalog.register_store(&req.store_name).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /stores/products: every product of the calling store.
#[tracing::instrument(skip(state))]
pub async fn list_products<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    StorePrincipal(store_id): StorePrincipal,
) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.catalog.store_products(store_id).await?))
}

/// POST /stores/products: add a product to the calling store.
#[tracing::instrument(skip(state, req))]
pub async fn add_product<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    StorePrincipal(store_id): StorePrincipal,
    Json(req): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = state.catalog.add_product(store_id, req).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// PATCH /stores/products/:id/availability: flip the availability flag.
#[tracing::instrument(skip(state))]
pub async fn toggle_availability<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    StorePrincipal(store_id): StorePrincipal,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let product_id: ProductId = parse_id(&id)?;
    Ok(Json(
        state
            .catalog
            .toggle_availability(store_id, product_id)
            .await?,
    ))
}

/// PUT /stores/products/:id: edit one of the store's products.
#[tracing::instrument(skip(state, req))]
pub async fn update_product<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    StorePrincipal(store_id): StorePrincipal,
    Path(id): Path<String>,
    Json(req): Json<ProductPatch>,
) -> Result<Json<Product>, ApiError> {
    let product_id: ProductId = parse_id(&id)?;
    Ok(Json(
        state
            .catalog
            .update_product(store_id, product_id, req)
            .await?,
    ))
}

/// DELETE /stores/products/:id: delete one of the store's products.
#[tracing::instrument(skip(state))]
pub async fn delete_product<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    StorePrincipal(store_id): StorePrincipal,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let product_id: ProductId = parse_id(&id)?;
    state.catalog.delete_product(store_id, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /stores/orders: orders placed with the calling store, newest first.
#[tracing::instrument(skip(state))]
pub async fn list_orders<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    StorePrincipal(store_id): StorePrincipal,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.lifecycle.list_store_orders(store_id).await?))
}

/// PATCH /stores/orders/:id/status: move an order along the lifecycle.
#[tracing::instrument(skip(state, req))]
pub async fn update_order_status<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    StorePrincipal(store_id): StorePrincipal,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    Ok(Json(
        state
            .lifecycle
            .update_status(store_id, order_id, req.status)
            .await?,
    ))
}
