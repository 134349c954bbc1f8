//! Checkout, payment callback and order history endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::{CheckoutReceipt, GatewayTransaction, PaymentConfirmation};
use common::{Money, OrderId, PaymentStatus};
use domain::OrderDetail;
use serde::{Deserialize, Serialize};
use storage::{CommerceStore, Order};

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;
use crate::principal::{AdminPrincipal, UserPrincipal};

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub address: String,
    pub amount: Money,
}

#[derive(Deserialize)]
pub struct PaymentFailedRequest {
    pub razorpay_order_id: String,
    /// Gateway error payload, logged only.
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
pub struct CreatePaymentRequest {
    pub amount: Money,
}

#[derive(Deserialize, Default)]
pub struct ReturnRequestBody {
    #[serde(default)]
    pub reason: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct PaymentResponse {
    pub payment_status: PaymentStatus,
    pub orders: Vec<Order>,
}

#[derive(Serialize)]
pub struct PaymentFailedResponse {
    pub payment_status: PaymentStatus,
    pub updated: u64,
}

#[derive(Serialize)]
pub struct GatewayKeyResponse {
    pub key: String,
}

// -- Handlers --

/// GET /orders: the caller's orders with line and product detail.
#[tracing::instrument(skip(state))]
pub async fn list<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    UserPrincipal(user_id): UserPrincipal,
) -> Result<Json<Vec<OrderDetail>>, ApiError> {
    Ok(Json(state.history.user_orders(user_id).await?))
}

/// POST /orders: check out every open cart line.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    UserPrincipal(user_id): UserPrincipal,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CheckoutReceipt>), ApiError> {
    let receipt = state
        .checkout
        .create_order(user_id, req.address, req.amount)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// POST /orders/verify: gateway callback with the payment signature.
#[tracing::instrument(skip(state, req))]
pub async fn verify<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    UserPrincipal(user_id): UserPrincipal,
    Json(req): Json<PaymentConfirmation>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let orders = state.reconciler.verify_payment(user_id, req).await?;
    Ok(Json(PaymentResponse {
        payment_status: PaymentStatus::Completed,
        orders,
    }))
}

/// POST /orders/payment-failed: client-reported payment failure.
#[tracing::instrument(skip(state, req), fields(gateway_order_id = %req.razorpay_order_id))]
pub async fn payment_failed<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    UserPrincipal(user_id): UserPrincipal,
    Json(req): Json<PaymentFailedRequest>,
) -> Result<Json<PaymentFailedResponse>, ApiError> {
    if let Some(error) = &req.error {
        tracing::warn!(%error, "Client reported payment failure");
    }
    let updated = state
        .reconciler
        .handle_payment_failure(user_id, &req.razorpay_order_id)
        .await?;
    Ok(Json(PaymentFailedResponse {
        payment_status: PaymentStatus::Failed,
        updated,
    }))
}

/// GET /orders/payment: public gateway key for the checkout widget.
pub async fn gateway_key<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<GatewayKeyResponse> {
    Json(GatewayKeyResponse {
        key: state.checkout.gateway_key().to_string(),
    })
}

/// POST /orders/payment: standalone gateway transaction.
#[tracing::instrument(skip(state, req))]
pub async fn create_payment<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _user: UserPrincipal,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<Json<GatewayTransaction>, ApiError> {
    Ok(Json(
        state.checkout.create_payment_transaction(req.amount).await?,
    ))
}

/// GET /orders/all: every order, newest first.
#[tracing::instrument(skip(state))]
pub async fn all<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminPrincipal,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.history.all_orders().await?))
}

/// PUT /orders/return/:id: request a return on a delivered order.
#[tracing::instrument(skip(state, req))]
pub async fn request_return<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    UserPrincipal(user_id): UserPrincipal,
    Path(id): Path<String>,
    req: Option<Json<ReturnRequestBody>>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    let reason = req.and_then(|Json(body)| body.reason);
    Ok(Json(
        state
            .lifecycle
            .initiate_return(user_id, order_id, reason)
            .await?,
    ))
}
