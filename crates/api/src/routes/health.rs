//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::EventPublisher;
use serde::Serialize;
use store::{Store, Transaction};

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
}

/// GET /health — reports whether the store can open a unit of work.
pub async fn check<S, P>(State(state): State<Arc<AppState<S, P>>>) -> (StatusCode, Json<HealthResponse>)
where
    S: Store + Clone + 'static,
    P: EventPublisher,
{
    let reachable = match state.store.begin().await {
        Ok(tx) => tx.rollback().await.is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "health check could not reach the store");
            false
        }
    };

    if reachable {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                store: "up",
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "degraded",
                store: "down",
            }),
        )
    }
}
