//! `/v1/admin/users` CRUD, deactivation, API-key issuance, and per-user
//! token-usage summary/detail endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
};
use chrono::{Duration as ChronoDuration, Utc};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    AppState,
    auth::generate_api_key,
    db::repos::{CursorDirection, ListParams, PageCursors, SortOrder},
    error::{ApiError, ApiResult},
    models::{
        ApiKeyWithSecret, CreateApiKey, CreateUser, TokenUsage, UpdateUser, User,
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", axum::routing::get(list_users).post(create_user))
        .route(
            "/users/{id}",
            axum::routing::get(get_user)
                .patch(update_user)
                .delete(deactivate_user),
        )
        .route("/users/{id}/deactivate", axum::routing::post(deactivate_user))
        .route("/users/{id}/api-keys", axum::routing::post(create_api_key))
        .route("/users/{id}/token-usage", axum::routing::get(token_usage_summary))
        .route(
            "/users/{id}/token-usage/details",
            axum::routing::get(token_usage_details),
        )
}

fn require_db(state: &AppState) -> ApiResult<&std::sync::Arc<crate::db::DbPool>> {
    state
        .db
        .as_ref()
        .ok_or_else(|| ApiError::Configuration("no database configured".to_string()))
}

async fn get_user_or_404(db: &crate::db::DbPool, id: Uuid) -> ApiResult<User> {
    db.users()
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {id} not found")))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<i64>,
}

#[derive(Serialize)]
struct UserListResponse {
    items: Vec<User>,
    has_more: bool,
    cursors: PageCursors,
}

async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<UserListResponse>> {
    let db = require_db(&state)?;
    let result = db
        .users()
        .list(ListParams {
            limit: query.limit,
            ..Default::default()
        })
        .await?;
    Ok(Json(UserListResponse {
        items: result.items,
        has_more: result.has_more,
        cursors: result.cursors,
    }))
}

async fn create_user(
    State(state): State<AppState>,
    Json(input): Json<CreateUser>,
) -> ApiResult<(StatusCode, Json<User>)> {
    use validator::Validate;
    input
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let db = require_db(&state)?;
    if db.users().get_by_username(&input.username).await?.is_some() {
        return Err(ApiError::AlreadyExists(format!(
            "user '{}' already exists",
            input.username
        )));
    }
    let user = db.users().create(input).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<User>> {
    let db = require_db(&state)?;
    Ok(Json(get_user_or_404(db, id).await?))
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateUser>,
) -> ApiResult<Json<User>> {
    use validator::Validate;
    input
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let db = require_db(&state)?;
    get_user_or_404(db, id).await?;
    Ok(Json(db.users().update(id, input).await?))
}

/// Deactivation is soft (`is_active=false`); a second call against an
/// already-deactivated (or non-existent) user is `EntityNotFound`.
async fn deactivate_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let db = require_db(&state)?;
    get_user_or_404(db, id).await?;
    db.users().deactivate(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_api_key(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<CreateApiKey>,
) -> ApiResult<(StatusCode, Json<ApiKeyWithSecret>)> {
    use validator::Validate;
    input
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let db = require_db(&state)?;
    get_user_or_404(db, id).await?;

    let (plaintext, key_hash) = generate_api_key();
    let key = db.api_keys().create(id, input, &key_hash).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiKeyWithSecret { key, plaintext }),
    ))
}

#[derive(Debug, Deserialize)]
struct WindowQuery {
    #[serde(default = "default_days")]
    days: i64,
}

fn default_days() -> i64 {
    30
}

async fn token_usage_summary(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<WindowQuery>,
) -> ApiResult<Json<crate::db::repos::TokenUsageTotals>> {
    let db = require_db(&state)?;
    get_user_or_404(db, id).await?;

    let until = Utc::now();
    let since = until - ChronoDuration::days(query.days.max(1));
    Ok(Json(db.token_usage().sum_for_user(id, since, until).await?))
}

#[derive(Debug, Deserialize)]
struct DetailsQuery {
    #[serde(default = "default_days")]
    days: i64,
    limit: Option<i64>,
}

#[derive(Serialize)]
struct TokenUsageDetailsResponse {
    items: Vec<TokenUsage>,
    has_more: bool,
    cursors: PageCursors,
}

/// `days` filters the returned page client-side after the repository's own
/// cursor pagination, since [`crate::db::repos::TokenUsageRepo::list_by_user`]
/// paginates by recency but does not itself take a time window.
async fn token_usage_details(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<DetailsQuery>,
) -> ApiResult<Json<TokenUsageDetailsResponse>> {
    let db = require_db(&state)?;
    get_user_or_404(db, id).await?;

    let result = db
        .token_usage()
        .list_by_user(
            id,
            ListParams {
                limit: query.limit,
                direction: CursorDirection::Forward,
                sort_order: SortOrder::Desc,
                ..Default::default()
            },
        )
        .await?;

    let cutoff = Utc::now() - ChronoDuration::days(query.days.max(1));
    let items: Vec<TokenUsage> = result
        .items
        .into_iter()
        .filter(|u| u.timestamp >= cutoff)
        .collect();

    Ok(Json(TokenUsageDetailsResponse {
        items,
        has_more: result.has_more,
        cursors: result.cursors,
    }))
}
