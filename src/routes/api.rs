//! The OpenAI-compatible surface: `/v1/chat/completions`, `/v1/completions`,
//! `/v1/models`, `/v1/whoami`.
//!
//! This is the request-forwarding engine: resolve the named model, check the
//! caller's group access, obtain a cached adapter, forward the call, and
//! record a [`TokenUsage`] row on success. Streaming responses are wrapped a
//! second time here — the adapter only hands back the raw upstream byte
//! stream, idle-timeout and usage accounting are applied on top of it.

use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::StreamExt;
use http::StatusCode;
use uuid::Uuid;

use crate::{
    AppState,
    auth::Principal,
    catalog,
    db::DbPool,
    error::ApiError,
    models::{
        ChatCompletionRequest, ChatCompletionResponse, CompletionRequest, CompletionResponse,
        Model, ModelInfo, ModelsResponse, TokenUsage,
    },
    providers::{ProviderAdapter, ProviderError, response::json_response},
    streaming::{IdleTimeoutStream, UsageContext, UsageTrackingStream},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat/completions", post(chat_completions))
        .route("/completions", post(completions))
        .route("/models", get(list_models))
        .route("/whoami", get(whoami))
}

/// Unifies the two error domains a route handler touches: catalog/access
/// errors ([`ApiError`]) and upstream call errors ([`ProviderError`]), so
/// handlers can use `?` across both.
#[derive(Debug, thiserror::Error)]
enum RouteError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        match self {
            RouteError::Api(e) => e.into_response(),
            RouteError::Provider(e) => e.into_response(),
        }
    }
}

type RouteResult<T> = Result<T, RouteError>;

fn require_db(state: &AppState) -> Result<&std::sync::Arc<DbPool>, ApiError> {
    state
        .db
        .as_ref()
        .ok_or_else(|| ApiError::Configuration("no database configured".to_string()))
}

/// Resolve the named model, enforce its `APPROVED` status, and check that
/// `principal` can reach it through at least one of their groups.
async fn resolve_routable_model(
    state: &AppState,
    principal: &Principal,
    requested: &str,
) -> Result<Model, ApiError> {
    let db = require_db(state)?;
    let model = catalog::resolve_requested_model(db, requested).await?;

    if !model.is_approved() {
        return Err(ApiError::Validation(format!(
            "model '{requested}' is not approved for routing"
        )));
    }

    let accessible = catalog::models_for_principal(db, &principal.groups).await?;
    if !accessible.iter().any(|m| m.id == model.id) {
        return Err(ApiError::Authorization(format!(
            "principal does not have access to model '{requested}'"
        )));
    }

    Ok(model)
}

fn build_adapter(
    state: &AppState,
    model: &Model,
) -> Result<std::sync::Arc<dyn ProviderAdapter>, ApiError> {
    state.adapters.get_or_build(model, &state.config.providers)
}

async fn chat_completions(
    State(state): State<AppState>,
    principal: Principal,
    Json(mut request): Json<ChatCompletionRequest>,
) -> RouteResult<Response> {
    let model = resolve_routable_model(&state, &principal, &request.model).await?;
    let adapter = build_adapter(&state, &model)?;
    request.model = model.technical_name.clone();

    let request_id = Uuid::new_v4();
    let endpoint = "/v1/chat/completions";
    let started_at = Instant::now();

    if request.stream == Some(true) {
        let response = adapter.stream_chat_completion(request).await?;
        return Ok(wrap_streaming_response(
            &state,
            response,
            principal.id,
            model.technical_name.clone(),
            request_id,
            endpoint,
        ));
    }

    let response = adapter.chat_completion(request).await?;
    record_usage(&state, &principal, &model, &response, request_id, endpoint).await;
    tracing::debug!(
        latency_ms = started_at.elapsed().as_millis() as i64,
        model = %model.technical_name,
        "chat completion served"
    );

    Ok(json_response(StatusCode::OK, &response)?)
}

async fn completions(
    State(state): State<AppState>,
    principal: Principal,
    Json(mut request): Json<CompletionRequest>,
) -> RouteResult<Response> {
    let model = resolve_routable_model(&state, &principal, &request.model).await?;
    let adapter = build_adapter(&state, &model)?;
    request.model = model.technical_name.clone();

    let request_id = Uuid::new_v4();
    let endpoint = "/v1/completions";
    let started_at = Instant::now();

    let response = adapter.completion(request).await?;
    record_completion_usage(&state, &principal, &model, &response, request_id, endpoint).await;
    tracing::debug!(
        latency_ms = started_at.elapsed().as_millis() as i64,
        model = %model.technical_name,
        "completion served"
    );

    Ok(json_response(StatusCode::OK, &response)?)
}

async fn list_models(
    State(state): State<AppState>,
    principal: Principal,
) -> RouteResult<Json<ModelsResponse>> {
    let db = require_db(&state).map_err(RouteError::Api)?;
    let models = catalog::models_for_principal(db, &principal.groups)
        .await
        .map_err(RouteError::Api)?;

    let data = models
        .into_iter()
        .map(|m| ModelInfo {
            id: m.technical_name,
            object: "model".to_string(),
            created: m.created_at.timestamp(),
            owned_by: m.provider.as_str().to_string(),
        })
        .collect();

    Ok(Json(ModelsResponse {
        object: "list".to_string(),
        data,
    }))
}

#[derive(serde::Serialize)]
struct WhoAmIResponse {
    id: Uuid,
    username: String,
    kind: &'static str,
    groups: Vec<String>,
}

/// `force_cache_clear` is handled by [`Principal`]'s own extractor; this
/// handler only reflects back what it resolved to.
async fn whoami(principal: Principal) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse {
        id: principal.id,
        username: principal.username,
        kind: principal.kind.as_str(),
        groups: principal.groups,
    })
}

/// On success, `chat_completion`'s success path writes a [`TokenUsage`]
/// row keyed off its reported usage; a failed write is logged and
/// swallowed, it never fails the already-completed request.
async fn record_usage(
    state: &AppState,
    principal: &Principal,
    model: &Model,
    response: &ChatCompletionResponse,
    request_id: Uuid,
    endpoint: &str,
) {
    let Some(db) = &state.db else { return };
    let Some(usage) = &response.usage else { return };

    let record = TokenUsage::new(
        principal.id,
        model.technical_name.clone(),
        usage.prompt_tokens,
        usage.completion_tokens,
        request_id,
        endpoint,
    );

    if let Err(e) = db.token_usage().record(record).await {
        tracing::warn!(error = %e, "failed to record chat completion token usage");
    }
}

async fn record_completion_usage(
    state: &AppState,
    principal: &Principal,
    model: &Model,
    response: &CompletionResponse,
    request_id: Uuid,
    endpoint: &str,
) {
    let Some(db) = &state.db else { return };
    let Some(usage) = &response.usage else { return };

    let record = TokenUsage::new(
        principal.id,
        model.technical_name.clone(),
        usage.prompt_tokens,
        usage.completion_tokens,
        request_id,
        endpoint,
    );

    if let Err(e) = db.token_usage().record(record).await {
        tracing::warn!(error = %e, "failed to record completion token usage");
    }
}

/// Re-wrap a provider adapter's streaming [`Response`] with idle-timeout
/// protection and token-usage accounting. Usage recording is skipped
/// silently (rather than failing the response) when no database is
/// configured, mirroring the non-streaming path's best-effort behavior.
fn wrap_streaming_response(
    state: &AppState,
    response: Response,
    user_id: Uuid,
    model: String,
    request_id: Uuid,
    endpoint: &str,
) -> Response {
    let Some(db) = state.db.clone() else {
        return response;
    };

    let idle_timeout = Duration::from_secs(state.config.server.streaming_idle_timeout_secs);
    let (parts, body) = response.into_parts();

    let byte_stream = body
        .into_data_stream()
        .map(|r| r.map_err(std::io::Error::other));
    let idle_guarded = IdleTimeoutStream::new(byte_stream, idle_timeout);

    let context = UsageContext {
        user_id,
        model,
        request_id,
        endpoint: endpoint.to_string(),
    };
    let tracked = UsageTrackingStream::new(idle_guarded, db, context, state.task_tracker.clone());

    Response::from_parts(parts, axum::body::Body::from_stream(tracked))
}
