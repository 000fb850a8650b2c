//! Library crate for the gateway binary.
//!
//! [`AppState`] is the single piece of shared state threaded through every
//! handler via axum's `State` extractor; [`build_app`] assembles the route
//! tree once it exists.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod net;
pub mod observability;
pub mod providers;
pub mod routes;
pub mod streaming;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    middleware::from_fn,
    routing::get,
};
use tokio_util::task::TaskTracker;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::{
    auth::{AuthState, JwtValidator, PrincipalCache},
    catalog::AdapterRegistry,
    config::GatewayConfig,
    db::DbPool,
    middleware::{request_id_middleware, security_headers_middleware},
};

/// Everything a request handler might need, cloned cheaply (every field is
/// an `Arc` or `Clone`-cheap) into each request's extensions.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub db: Option<Arc<DbPool>>,
    pub jwt_validator: Option<Arc<JwtValidator>>,
    pub principal_cache: Arc<PrincipalCache>,
    pub adapters: Arc<AdapterRegistry>,
    pub http_client: reqwest::Client,
    pub task_tracker: TaskTracker,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        AuthState {
            db: state.db.clone(),
            jwt_validator: state.jwt_validator.clone(),
            principal_cache: state.principal_cache.clone(),
        }
    }
}

/// Failure modes for building [`AppState`] at startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    #[error("failed to build outbound HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl AppState {
    pub async fn new(config: GatewayConfig) -> Result<Self, StartupError> {
        let db = if config.database.is_none() {
            None
        } else {
            Some(Arc::new(DbPool::connect(&config.database).await?))
        };

        let http_client = config.server.http_client.build_client()?;

        let jwt_validator = config
            .jwt
            .clone()
            .map(|jwt_config| Arc::new(JwtValidator::new(jwt_config, http_client.clone())));

        Ok(Self {
            config: Arc::new(config),
            db,
            jwt_validator,
            principal_cache: Arc::new(PrincipalCache::new()),
            adapters: Arc::new(AdapterRegistry::new()),
            http_client,
            task_tracker: TaskTracker::new(),
        })
    }
}

/// Assemble the full route tree: the OpenAI-compatible surface under `/v1`,
/// the admin surface under `/v1/admin` (gated by [`middleware::admin`]), and
/// the health probes, wrapped in request-id/security-header/trace/body-limit
/// layers applied to every request.
pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    let cors_layer = state.config.server.cors.clone().into_layer();

    let admin_routes = routes::admin::router().layer(from_fn(middleware::admin_middleware));

    let v1_routes = Router::new()
        .merge(routes::api::router())
        .merge(routes::health::router())
        .nest("/admin", admin_routes)
        .layer(from_fn(middleware::audit_middleware));

    let mount_path = match state.config.server.api_base_path.as_deref() {
        Some(base) if !base.is_empty() => format!("{base}/v1"),
        _ => "/v1".to_string(),
    };

    let mut app = Router::new()
        .nest(&mount_path, v1_routes)
        .route("/", get(|| async { "ok" }));

    app = app
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(request_id_middleware));

    if let Some(cors) = cors_layer {
        app = app.layer(cors);
    }

    app.with_state(state)
}
