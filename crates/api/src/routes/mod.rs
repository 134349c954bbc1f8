//! Route handlers, one module per resource.

pub mod cart;
pub mod health;
pub mod likes;
pub mod metrics;
pub mod orders;
pub mod products;
pub mod shipping;
pub mod stores;

use crate::error::ApiError;

/// Parses a typed id from a path segment.
pub(crate) fn parse_id<T: From<uuid::Uuid>>(id: &str) -> Result<T, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))?;
    Ok(T::from(uuid))
}
