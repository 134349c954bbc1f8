//! Cart endpoints for the calling user.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CartLineId, ProductId};
use domain::{CartView, SyncOutcome};
use serde::{Deserialize, Serialize};
use storage::{CartLine, CommerceStore};

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;
use crate::principal::UserPrincipal;

#[derive(Deserialize)]
pub struct SyncRequest {
    pub product_ids: Vec<ProductId>,
}

#[derive(Deserialize)]
pub struct UpdateRequest {
    pub quantity: i64,
}

#[derive(Serialize)]
pub struct UpdateResponse {
    /// `None` when the update removed the line.
    pub line: Option<CartLine>,
    pub removed: bool,
}

/// GET /cart: open cart lines with totals.
#[tracing::instrument(skip(state))]
pub async fn items<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    UserPrincipal(user_id): UserPrincipal,
) -> Result<Json<CartView>, ApiError> {
    Ok(Json(state.cart.get_cart_items(user_id).await?))
}

/// POST /cart/sync: reserve one unit of each listed product not yet in
/// the cart.
#[tracing::instrument(skip(state, req))]
pub async fn sync<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    UserPrincipal(user_id): UserPrincipal,
    Json(req): Json<SyncRequest>,
) -> Result<Json<SyncOutcome>, ApiError> {
    Ok(Json(state.cart.sync_cart(user_id, req.product_ids).await?))
}

/// POST /cart/:product_id: reserve one unit into the cart.
#[tracing::instrument(skip(state))]
pub async fn add<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    UserPrincipal(user_id): UserPrincipal,
    Path(product_id): Path<String>,
) -> Result<(StatusCode, Json<CartLine>), ApiError> {
    let product_id: ProductId = parse_id(&product_id)?;
    let line = state.cart.add_to_cart(user_id, product_id).await?;
    Ok((StatusCode::CREATED, Json(line)))
}

/// PUT /cart/update/:id: set a line's quantity; zero or less removes it.
#[tracing::instrument(skip(state, req))]
pub async fn update<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    UserPrincipal(user_id): UserPrincipal,
    Path(id): Path<String>,
    Json(req): Json<UpdateRequest>,
) -> Result<Json<UpdateResponse>, ApiError> {
    let line_id: CartLineId = parse_id(&id)?;
    let line = state
        .cart
        .update_cart_item(user_id, line_id, req.quantity)
        .await?;
    Ok(Json(UpdateResponse {
        removed: line.is_none(),
        line,
    }))
}

/// DELETE /cart/remove/:id: delete a line and release its units.
#[tracing::instrument(skip(state))]
pub async fn remove<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    UserPrincipal(user_id): UserPrincipal,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let line_id: CartLineId = parse_id(&id)?;
    state.cart.remove_from_cart(user_id, line_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
