//! `/v1/admin/groups` CRUD.

use axum::{
    Json, Router,
    extract::{Path, State},
};
use http::StatusCode;

use crate::{
    AppState,
    error::{ApiError, ApiResult},
    models::{CreateGroup, Group, UpdateGroup},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/groups", axum::routing::get(list_groups).post(create_group))
        .route(
            "/groups/{id}",
            axum::routing::get(get_group)
                .patch(update_group)
                .delete(delete_group),
        )
}

fn require_db(state: &AppState) -> ApiResult<&std::sync::Arc<crate::db::DbPool>> {
    state
        .db
        .as_ref()
        .ok_or_else(|| ApiError::Configuration("no database configured".to_string()))
}

async fn list_groups(State(state): State<AppState>) -> ApiResult<Json<Vec<Group>>> {
    let db = require_db(&state)?;
    Ok(Json(db.groups().list().await?))
}

async fn create_group(
    State(state): State<AppState>,
    Json(input): Json<CreateGroup>,
) -> ApiResult<(StatusCode, Json<Group>)> {
    use validator::Validate;
    input
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let db = require_db(&state)?;
    if db.groups().get_by_name(&input.name).await?.is_some() {
        return Err(ApiError::AlreadyExists(format!(
            "group '{}' already exists",
            input.name
        )));
    }
    let group = db.groups().create(input).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

async fn get_group(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Group>> {
    let db = require_db(&state)?;
    let group = db
        .groups()
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("group {id} not found")))?;
    Ok(Json(group))
}

async fn update_group(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateGroup>,
) -> ApiResult<Json<Group>> {
    let db = require_db(&state)?;
    db.groups()
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("group {id} not found")))?;
    Ok(Json(db.groups().update(id, input).await?))
}

async fn delete_group(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let db = require_db(&state)?;
    db.groups()
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("group {id} not found")))?;
    db.groups().delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
