//! Tutorial endpoints

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};

use crate::db::repos::TutorialRepo;
use crate::db::{Connector, Row, Session};
use crate::http::error::ApiError;
use crate::http::server::AppState;

/// GET /tutorials - list all tutorials
async fn list_tutorials<C>(
    State(state): State<Arc<AppState<C>>>,
) -> Result<Json<Vec<Row>>, ApiError>
where
    C: Connector,
    C::Connection: Session,
{
    let tutorials = TutorialRepo::new(&state.db).list().await?;
    Ok(Json(tutorials))
}

/// Tutorial routes
pub fn router<C>() -> Router<Arc<AppState<C>>>
where
    C: Connector,
    C::Connection: Session,
{
    Router::new().route("/tutorials", get(list_tutorials::<C>))
}
