//! `POST/GET /v1/admin/models`, `GET/PATCH/DELETE /v1/admin/models/{id}`,
//! `PATCH /v1/admin/models/{id}/status`, `POST /v1/admin/models/refresh`,
//! `POST/DELETE /v1/admin/models/{id}/groups/{group_id}`.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, patch, post},
};
use http::StatusCode;
use serde::Deserialize;

use crate::{
    AppState,
    catalog::{self, RefreshReport},
    error::{ApiError, ApiResult},
    models::{CreateModel, Group, Model, ModelStatus, UpdateModel},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/models", get(list_models).post(create_model))
        .route(
            "/models/{id}",
            get(get_model).patch(update_model).delete(delete_model),
        )
        .route("/models/{id}/status", patch(set_status))
        .route("/models/refresh", post(refresh_models))
        .route("/models/{id}/groups", get(list_model_groups))
        .route(
            "/models/{id}/groups/{group_id}",
            post(add_group).delete(remove_group),
        )
}

fn require_db(state: &AppState) -> ApiResult<&std::sync::Arc<crate::db::DbPool>> {
    state
        .db
        .as_ref()
        .ok_or_else(|| ApiError::Configuration("no database configured".to_string()))
}

async fn list_models(State(state): State<AppState>) -> ApiResult<Json<Vec<Model>>> {
    let db = require_db(&state)?;
    Ok(Json(catalog::get_all_models(db).await?))
}

async fn create_model(
    State(state): State<AppState>,
    Json(input): Json<CreateModel>,
) -> ApiResult<(StatusCode, Json<Model>)> {
    use validator::Validate;
    input
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let db = require_db(&state)?;
    let model = catalog::create_model(db, input).await?;
    Ok((StatusCode::CREATED, Json(model)))
}

async fn get_model(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Model>> {
    let db = require_db(&state)?;
    Ok(Json(catalog::get_model(db, id).await?))
}

async fn update_model(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateModel>,
) -> ApiResult<Json<Model>> {
    use validator::Validate;
    input
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let db = require_db(&state)?;
    Ok(Json(catalog::update_model(db, id, input).await?))
}

async fn delete_model(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let db = require_db(&state)?;
    catalog::delete_model(db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct SetStatusBody {
    status: ModelStatus,
}

async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<SetStatusBody>,
) -> ApiResult<Json<Model>> {
    let db = require_db(&state)?;
    Ok(Json(catalog::set_model_status(db, id, body.status).await?))
}

async fn refresh_models(State(state): State<AppState>) -> ApiResult<Json<RefreshReport>> {
    let db = require_db(&state)?;
    let report = catalog::refresh_models(db, &state.config.providers, &state.adapters).await?;
    Ok(Json(report))
}

async fn list_model_groups(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<Group>>> {
    let db = require_db(&state)?;
    Ok(Json(catalog::get_groups_for_model(db, id).await?))
}

async fn add_group(
    State(state): State<AppState>,
    Path((id, group_id)): Path<(i64, i64)>,
) -> ApiResult<Json<Model>> {
    let db = require_db(&state)?;
    Ok(Json(catalog::add_model_to_group(db, id, group_id).await?))
}

async fn remove_group(
    State(state): State<AppState>,
    Path((id, group_id)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    let db = require_db(&state)?;
    catalog::remove_model_from_group(db, id, group_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
