//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CartItemId, ProductId};
use domain::{CartSnapshot, EventPublisher};
use serde::Deserialize;
use store::Store;

use super::{json_body, path_id};
use crate::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i32,
}

// -- Handlers --

/// GET /cart — the caller's cart, or an empty view if they have none.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static, P: EventPublisher>(
    State(state): State<Arc<AppState<S, P>>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<CartSnapshot>, ApiError> {
    Ok(Json(state.carts.get_cart(user_id).await?))
}

/// POST /cart — create the caller's cart (registration hook). Idempotent.
#[tracing::instrument(skip(state))]
pub async fn create<S: Store + Clone + 'static, P: EventPublisher>(
    State(state): State<Arc<AppState<S, P>>>,
    AuthUser(user_id): AuthUser,
) -> Result<(StatusCode, Json<CartSnapshot>), ApiError> {
    let cart = state.carts.create_cart(user_id).await?;
    Ok((StatusCode::CREATED, Json(cart)))
}

/// POST /cart/items — add a product to the caller's cart.
#[tracing::instrument(skip(state, body))]
pub async fn add_item<S: Store + Clone + 'static, P: EventPublisher>(
    State(state): State<Arc<AppState<S, P>>>,
    AuthUser(user_id): AuthUser,
    body: Result<Json<AddItemRequest>, JsonRejection>,
) -> Result<Json<CartSnapshot>, ApiError> {
    let req = json_body(body)?;
    let cart = state
        .carts
        .add_item(user_id, req.product_id, req.quantity)
        .await?;
    Ok(Json(cart))
}

/// PUT /cart/items/{id} — replace the quantity of one of the caller's lines.
#[tracing::instrument(skip(state, path, body))]
pub async fn update_item<S: Store + Clone + 'static, P: EventPublisher>(
    State(state): State<Arc<AppState<S, P>>>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<UpdateItemRequest>, JsonRejection>,
) -> Result<Json<CartSnapshot>, ApiError> {
    let item_id = CartItemId::new(path_id(path)?);
    let req = json_body(body)?;
    let cart = state
        .carts
        .update_item(user_id, item_id, req.quantity)
        .await?;
    Ok(Json(cart))
}

/// DELETE /cart/items/{id} — remove one of the caller's lines.
#[tracing::instrument(skip(state, path))]
pub async fn remove_item<S: Store + Clone + 'static, P: EventPublisher>(
    State(state): State<Arc<AppState<S, P>>>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<CartSnapshot>, ApiError> {
    let item_id = CartItemId::new(path_id(path)?);
    Ok(Json(state.carts.remove_item(user_id, item_id).await?))
}
