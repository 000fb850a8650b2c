//! Health check endpoints for load balancer and orchestrator probes.

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use http::StatusCode;
use serde::Serialize;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(live))
        .route("/health/ready", get(ready))
        .route("/health/detailed", get(detailed))
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

/// Always `200 ok`: process is up and able to handle HTTP at all.
async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

/// Liveness: identical to [`health`] — there is no internal watchdog state
/// that would make this gateway alive-but-unhealthy.
async fn live() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

/// Readiness: `503` when a database is configured but unreachable, so a load
/// balancer stops sending traffic during an outage rather than returning
/// 401s for every authenticated request.
async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    match &state.db {
        None => (StatusCode::OK, Json(HealthBody { status: "ok" })),
        Some(db) => match db.ping().await {
            Ok(()) => (StatusCode::OK, Json(HealthBody { status: "ok" })),
            Err(e) => {
                tracing::warn!(error = %e, "readiness probe: database ping failed");
                (StatusCode::SERVICE_UNAVAILABLE, Json(HealthBody { status: "not_ready" }))
            }
        },
    }
}

#[derive(Serialize)]
struct DetailedHealthBody {
    status: &'static str,
    database: DatabaseHealth,
}

#[derive(Serialize)]
struct DatabaseHealth {
    configured: bool,
    backend: Option<&'static str>,
    reachable: Option<bool>,
}

async fn detailed(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.db {
        None => DatabaseHealth {
            configured: false,
            backend: None,
            reachable: None,
        },
        Some(db) => DatabaseHealth {
            configured: true,
            backend: Some(db.backend_name()),
            reachable: Some(db.ping().await.is_ok()),
        },
    };

    let status = if database.configured && database.reachable == Some(false) {
        "degraded"
    } else {
        "ok"
    };

    Json(DetailedHealthBody { status, database })
}
