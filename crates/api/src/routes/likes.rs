//! Like (wishlist) endpoints for the calling user.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use domain::LikedProduct;
use storage::{CommerceStore, Like};

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;
use crate::principal::UserPrincipal;

/// GET /likes: liked products, oldest like first.
#[tracing::instrument(skip(state))]
pub async fn list<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    UserPrincipal(user_id): UserPrincipal,
) -> Result<Json<Vec<LikedProduct>>, ApiError> {
    Ok(Json(state.likes.fetch_likes(user_id).await?))
}

/// POST /likes/:product_id: like a product. 201 when new, 200 when the
/// like already existed.
#[tracing::instrument(skip(state))]
pub async fn add<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    UserPrincipal(user_id): UserPrincipal,
    Path(product_id): Path<String>,
) -> Result<(StatusCode, Json<Like>), ApiError> {
    let product_id: ProductId = parse_id(&product_id)?;
    let outcome = state.likes.add_like(user_id, product_id).await?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome.like)))
}

/// DELETE /likes/:product_id: remove the like on a product.
#[tracing::instrument(skip(state))]
pub async fn remove<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    UserPrincipal(user_id): UserPrincipal,
    Path(product_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let product_id: ProductId = parse_id(&product_id)?;
    state.likes.remove_like(user_id, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
