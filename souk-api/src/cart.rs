use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use souk_core::identity::Principal;
use souk_shared::{CartItem, Id, ProductRef};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddCartItemRequest {
    pub product: ProductRef,
    pub quantity: i32,
    #[serde(default)]
    pub size: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/cart", get(view_cart))
        .route("/v1/cart/items", post(add_cart_item))
        .route("/v1/cart/items/{id}", delete(remove_cart_item))
}

async fn view_cart(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<CartItem>>, AppError> {
    Ok(Json(state.cart().view_cart(&principal).await?))
}

async fn add_cart_item(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<AddCartItemRequest>,
) -> Result<(StatusCode, Json<CartItem>), AppError> {
    let item = state
        .cart()
        .add_cart_item(&principal, req.product, req.quantity, req.size)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn remove_cart_item(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Id>,
) -> Result<StatusCode, AppError> {
    state.cart().remove_cart_item(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
