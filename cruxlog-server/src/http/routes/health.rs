//! Liveness endpoints

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::db::{Connector, PoolStatus, Session};
use crate::http::server::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub pool: PoolStatus,
}

/// GET /
async fn index() -> &'static str {
    "Server is running!"
}

/// GET /health
async fn health<C>(State(state): State<Arc<AppState<C>>>) -> Json<HealthResponse>
where
    C: Connector,
    C::Connection: Session,
{
    let pool = state.db.pool().status();
    Json(HealthResponse {
        status: if pool.closed { "closing" } else { "ok" },
        version: env!("CARGO_PKG_VERSION"),
        pool,
    })
}

/// Health routes
pub fn router<C>() -> Router<Arc<AppState<C>>>
where
    C: Connector,
    C::Connection: Session,
{
    Router::new()
        .route("/", get(index))
        .route("/health", get(health::<C>))
}
