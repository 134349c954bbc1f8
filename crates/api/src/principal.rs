//! Principals injected by the upstream credential layer.
//!
//! Each principal arrives as a UUID header. A missing or malformed header
//! rejects the request with 401.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{AdminId, StoreId, UserId};

use crate::error::ApiError;

pub const USER_HEADER: &str = "x-user-id";
pub const STORE_HEADER: &str = "x-store-id";
pub const ADMIN_HEADER: &str = "x-admin-id";

fn header_uuid(parts: &Parts, name: &str) -> Result<uuid::Uuid, ApiError> {
    let value = parts
        .headers
        .get(name)
        .ok_or_else(|| ApiError::Unauthorized(format!("Missing {name} header")))?;
    value
        .to_str()
        .ok()
        .and_then(|v| uuid::Uuid::parse_str(v.trim()).ok())
        .ok_or_else(|| ApiError::Unauthorized(format!("Invalid {name} header")))
}

/// Authenticated customer.
#[derive(Debug, Clone, Copy)]
pub struct UserPrincipal(pub UserId);

/// Authenticated store owner.
#[derive(Debug, Clone, Copy)]
pub struct StorePrincipal(pub StoreId);

/// Authenticated administrator.
#[derive(Debug, Clone, Copy)]
pub struct AdminPrincipal(pub AdminId);

impl<S: Send + Sync> FromRequestParts<S> for UserPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_uuid(parts, USER_HEADER).map(|id| UserPrincipal(UserId::from_uuid(id)))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for StorePrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_uuid(parts, STORE_HEADER).map(|id| StorePrincipal(StoreId::from_uuid(id)))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AdminPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_uuid(parts, ADMIN_HEADER).map(|id| AdminPrincipal(AdminId::from_uuid(id)))
    }
}
