use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{patch, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use souk_core::identity::Principal;
use souk_shared::{CancellationReason, CancellationRequest, ClaimedOrder, DeliveryStatus, Id};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DeliveryStatusRequest {
    pub status: DeliveryStatus,
}

#[derive(Debug, Deserialize)]
pub struct CancellationRequestBody {
    pub reason: CancellationReason,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/orders/{id}/claim", post(claim_order))
        .route("/v1/claims/{id}/pickup", post(confirm_pickup))
        .route("/v1/claims/{id}/delivery-status", patch(update_delivery_status))
        .route("/v1/claims/{id}/cancellation-requests", post(file_cancellation_request))
        .route("/v1/cancellation-requests/{id}/approve", post(approve_cancellation_request))
}

async fn claim_order(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(order_id): Path<Id>,
) -> Result<(StatusCode, Json<ClaimedOrder>), AppError> {
    let claim = state.claims().claim_order(&principal, order_id, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(claim)))
}

async fn confirm_pickup(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(claim_id): Path<Id>,
) -> Result<Json<ClaimedOrder>, AppError> {
    Ok(Json(state.claims().confirm_pickup(&principal, claim_id, Utc::now()).await?))
}

async fn update_delivery_status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(claim_id): Path<Id>,
    Json(req): Json<DeliveryStatusRequest>,
) -> Result<Json<ClaimedOrder>, AppError> {
    let claim = state
        .claims()
        .update_delivery_status(&principal, claim_id, req.status)
        .await?;
    Ok(Json(claim))
}

async fn file_cancellation_request(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(claim_id): Path<Id>,
    Json(req): Json<CancellationRequestBody>,
) -> Result<(StatusCode, Json<CancellationRequest>), AppError> {
    let request = state
        .cancellations()
        .file_cancellation_request(&principal, claim_id, req.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn approve_cancellation_request(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(request_id): Path<Id>,
) -> Result<Json<CancellationRequest>, AppError> {
    Ok(Json(
        state
            .cancellations()
            .approve_cancellation_request(&principal, request_id)
            .await?,
    ))
}
