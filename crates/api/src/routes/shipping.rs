//! Shipping endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::ShippedOrder;
use common::OrderId;
use storage::{CommerceStore, Shipment};

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;
use crate::principal::{StorePrincipal, UserPrincipal};

/// POST /shipping/:order_id: hand a store's order to the courier.
#[tracing::instrument(skip(state))]
pub async fn ship<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    StorePrincipal(store_id): StorePrincipal,
    Path(order_id): Path<String>,
) -> Result<(StatusCode, Json<ShippedOrder>), ApiError> {
    let order_id: OrderId = parse_id(&order_id)?;
    let shipped = state.shipping.ship_order(store_id, order_id).await?;
    Ok((StatusCode::CREATED, Json(shipped)))
}

/// GET /shipping/:order_id: shipment of one of the caller's orders.
#[tracing::instrument(skip(state))]
pub async fn get<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    UserPrincipal(user_id): UserPrincipal,
    Path(order_id): Path<String>,
) -> Result<Json<Shipment>, ApiError> {
    let order_id: OrderId = parse_id(&order_id)?;
    Ok(Json(
        state.shipping.shipment_for_order(user_id, order_id).await?,
    ))
}
