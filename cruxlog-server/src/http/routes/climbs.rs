//! Climb endpoints

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;

use crate::db::repos::{Climb, ClimbRepo, MonthlyAverage, NewClimb};
use crate::db::{Connector, Session};
use crate::http::error::ApiError;
use crate::http::extractors::{JsonBody, PathParams};
use crate::http::server::AppState;

/// Id of a logged climb
#[derive(Serialize)]
pub struct ClimbIdResponse {
    pub id: Option<i64>,
}

/// Delete confirmation
#[derive(Serialize)]
pub struct DeletedResponse {
    pub message: &'static str,
}

/// GET /climbs - list every climb
async fn list_climbs<C>(State(state): State<Arc<AppState<C>>>) -> Result<Json<Vec<Climb>>, ApiError>
where
    C: Connector,
    C::Connection: Session,
{
    let climbs = ClimbRepo::new(&state.db).list().await?;
    Ok(Json(climbs))
}

/// GET /climbs/{user_id} - list one user's climbs
async fn list_user_climbs<C>(
    State(state): State<Arc<AppState<C>>>,
    PathParams(user_id): PathParams<i64>,
) -> Result<Json<Vec<Climb>>, ApiError>
where
    C: Connector,
    C::Connection: Session,
{
    let climbs = ClimbRepo::new(&state.db).list_for_user(user_id).await?;
    Ok(Json(climbs))
}

/// POST /climbs - log a climb
async fn create_climb<C>(
    State(state): State<Arc<AppState<C>>>,
    JsonBody(climb): JsonBody<NewClimb>,
) -> Result<(StatusCode, Json<ClimbIdResponse>), ApiError>
where
    C: Connector,
    C::Connection: Session,
{
    let id = ClimbRepo::new(&state.db).create(&climb).await?;
    tracing::debug!(user_id = climb.user_id, climb_id = ?id, "climb logged");
    Ok((StatusCode::CREATED, Json(ClimbIdResponse { id })))
}

/// DELETE /climbs/{user_id}/{climb_id} - delete one of a user's climbs
async fn delete_climb<C>(
    State(state): State<Arc<AppState<C>>>,
    PathParams((user_id, climb_id)): PathParams<(i64, i64)>,
) -> Result<Json<DeletedResponse>, ApiError>
where
    C: Connector,
    C::Connection: Session,
{
    if !ClimbRepo::new(&state.db).delete(user_id, climb_id).await? {
        return Err(ApiError::not_found("climb", climb_id));
    }

    Ok(Json(DeletedResponse {
        message: "Climb deleted successfully",
    }))
}

/// GET /climbs/average/{user_id} - mean difficulty per month
async fn monthly_average<C>(
    State(state): State<Arc<AppState<C>>>,
    PathParams(user_id): PathParams<i64>,
) -> Result<Json<Vec<MonthlyAverage>>, ApiError>
where
    C: Connector,
    C::Connection: Session,
{
    let months = ClimbRepo::new(&state.db).monthly_average(user_id).await?;
    Ok(Json(months))
}

/// Climb routes
pub fn router<C>() -> Router<Arc<AppState<C>>>
where
    C: Connector,
    C::Connection: Session,
{
    Router::new()
        .route("/climbs", get(list_climbs::<C>).post(create_climb::<C>))
        .route("/climbs/{user_id}", get(list_user_climbs::<C>))
        .route("/climbs/{user_id}/{climb_id}", delete(delete_climb::<C>))
        .route("/climbs/average/{user_id}", get(monthly_average::<C>))
}
