use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use souk_core::identity::Principal;
use souk_shared::{Id, Notification, Strike};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/notifications", get(list_notifications))
        .route("/v1/notifications/{id}/read", post(mark_read))
        .route("/v1/strikes", get(list_strikes))
}

async fn list_notifications(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Notification>>, AppError> {
    Ok(Json(state.inbox().list_notifications(&principal).await?))
}

async fn mark_read(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Id>,
) -> Result<StatusCode, AppError> {
    state.inbox().mark_notification_read(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_strikes(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Strike>>, AppError> {
    Ok(Json(state.inbox().list_strikes(&principal).await?))
}
