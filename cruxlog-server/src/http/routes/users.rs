//! User endpoints

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use crate::db::repos::{NewUser, User, UserRepo};
use crate::db::{Connector, Session};
use crate::http::error::ApiError;
use crate::http::extractors::{JsonBody, PathParams};
use crate::http::server::AppState;

/// Id of a saved user
#[derive(Serialize)]
pub struct UserIdResponse {
    pub id: i64,
}

/// GET /user - list all users
async fn list_users<C>(State(state): State<Arc<AppState<C>>>) -> Result<Json<Vec<User>>, ApiError>
where
    C: Connector,
    C::Connection: Session,
{
    let users = UserRepo::new(&state.db).list().await?;
    Ok(Json(users))
}

/// GET /user/{id} - get a single user
async fn get_user<C>(
    State(state): State<Arc<AppState<C>>>,
    PathParams(id): PathParams<i64>,
) -> Result<Json<User>, ApiError>
where
    C: Connector,
    C::Connection: Session,
{
    UserRepo::new(&state.db)
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("user", id))
}

/// POST /user - create or update a user by Google id
async fn save_user<C>(
    State(state): State<Arc<AppState<C>>>,
    JsonBody(user): JsonBody<NewUser>,
) -> Result<(StatusCode, Json<UserIdResponse>), ApiError>
where
    C: Connector,
    C::Connection: Session,
{
    let id = UserRepo::new(&state.db).upsert(&user).await?;
    Ok((StatusCode::CREATED, Json(UserIdResponse { id })))
}

/// User routes
pub fn router<C>() -> Router<Arc<AppState<C>>>
where
    C: Connector,
    C::Connection: Session,
{
    Router::new()
        .route("/user", get(list_users::<C>).post(save_user::<C>))
        .route("/user/{id}", get(get_user::<C>))
}
