//! Checkout and order history endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::OrderId;
use domain::{EventPublisher, OrderPage, OrderSnapshot};
use serde::Deserialize;
use store::{PageRequest, Store, page::DEFAULT_PAGE_SIZE};

use super::path_id;
use crate::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl ListOrdersQuery {
    fn page_request(&self) -> PageRequest {
        PageRequest::new(
            self.page.unwrap_or(1),
            self.limit.unwrap_or(i64::from(DEFAULT_PAGE_SIZE)),
        )
    }
}

/// POST /orders — check out the caller's cart.
#[tracing::instrument(skip(state))]
pub async fn create<S: Store + Clone + 'static, P: EventPublisher>(
    State(state): State<Arc<AppState<S, P>>>,
    AuthUser(user_id): AuthUser,
) -> Result<(StatusCode, Json<OrderSnapshot>), ApiError> {
    let order = state.checkout.create_order(user_id).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders?page&limit — the caller's orders, newest first.
#[tracing::instrument(skip(state, query))]
pub async fn list<S: Store + Clone + 'static, P: EventPublisher>(
    State(state): State<Arc<AppState<S, P>>>,
    AuthUser(user_id): AuthUser,
    query: Result<Query<ListOrdersQuery>, QueryRejection>,
) -> Result<Json<OrderPage>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let page = state
        .orders
        .list_orders(user_id, query.page_request())
        .await?;
    Ok(Json(page))
}

/// GET /orders/{id} — one of the caller's orders.
#[tracing::instrument(skip(state, path))]
pub async fn get<S: Store + Clone + 'static, P: EventPublisher>(
    State(state): State<Arc<AppState<S, P>>>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<OrderSnapshot>, ApiError> {
    let order_id = OrderId::new(path_id(path)?);
    Ok(Json(state.orders.get_order(user_id, order_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_defaults_and_clamps() {
        let query = ListOrdersQuery {
            page: None,
            limit: None,
        };
        assert_eq!(query.page_request(), PageRequest::new(1, 10));

        let query = ListOrdersQuery {
            page: Some(-4),
            limit: Some(500),
        };
        let page = query.page_request();
        assert_eq!(page.page(), 1);
        assert_eq!(page.page_size(), 100);
    }
}
