use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use souk_core::identity::{Principal, Role};
use souk_core::CoreError;
use souk_order::{CheckoutReceipt, CheckoutRequest, OrderDetails};
use souk_shared::{CartOrder, CartOrderItem, GlobalOrder, Id, OrderStatus};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/checkout", post(checkout))
        .route("/v1/global-orders", get(list_global_orders))
        .route("/v1/orders/{id}", get(get_order))
        .route("/v1/orders/{id}/cancel", post(cancel_order))
        .route("/v1/orders/{id}/status", patch(update_order_status))
        .route("/v1/order-lines/{id}/cancel", post(cancel_order_line))
}

async fn checkout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutReceipt>), AppError> {
    let receipt = state.checkout().checkout(&principal, req, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn list_global_orders(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<GlobalOrder>>, AppError> {
    Ok(Json(state.checkout().global_orders(&principal).await?))
}

async fn get_order(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Id>,
) -> Result<Json<OrderDetails>, AppError> {
    Ok(Json(state.orders().order(&principal, id).await?))
}

async fn cancel_order(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Id>,
) -> Result<Json<CartOrder>, AppError> {
    Ok(Json(state.orders().cancel_order_by_client(&principal, id).await?))
}

async fn update_order_status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Id>,
    Json(req): Json<UpdateOrderStatusRequest>,
) -> Result<Json<CartOrder>, AppError> {
    let order = state
        .orders()
        .update_order_status_by_vendor(&principal, id, req.status)
        .await?;
    Ok(Json(order))
}

/// Clients and vendors share the route; the role picks the rule set.
async fn cancel_order_line(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Id>,
) -> Result<Json<CartOrderItem>, AppError> {
    let orders = state.orders();
    let line = match principal.role {
        Role::Client(_) => orders.cancel_line_by_client(&principal, id).await?,
        Role::Vendor(_) => orders.cancel_line_by_vendor(&principal, id).await?,
        _ => return Err(CoreError::permission("only clients and vendors can cancel order lines").into()),
    };
    Ok(Json(line))
}
