//! Records one [`AuditLog`] per request: method, path, principal (if any),
//! auth kind, status code, and wall-clock duration. Excluded paths are
//! never recorded. Persistence and forwarder fan-out never fail the
//! request that generated the record.

use std::time::Instant;

use axum::{
    extract::{FromRef, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

use crate::{
    AppState,
    auth::{AuthState, Principal},
    config::{AuditLogLevel, HttpForwarderConfig, PrintForwarderConfig},
    models::AuditLog,
    net::client::{ClientFactory, ClientFactoryOptions},
    providers::retry::{ProviderRequestError, with_retry},
};

/// Best-effort principal extraction: auth failures are not this
/// middleware's concern, they surface from the handler's own extractor.
async fn try_principal(parts: &mut Parts, state: &AppState) -> Option<Principal> {
    let auth_state = AuthState::from_ref(state);
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    crate::auth::resolve_principal(&auth_state, header).await.ok()
}

pub async fn audit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();

    if state.config.audit.exclude_paths().iter().any(|p| p == &path) {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let started_at = Instant::now();

    let (mut parts, body) = req.into_parts();
    let principal = try_principal(&mut parts, &state).await;
    let req = Request::from_parts(parts, body);

    let response = next.run(req).await;

    let record = AuditLog {
        id: uuid::Uuid::new_v4(),
        timestamp: chrono::Utc::now(),
        method,
        path,
        user: principal.as_ref().map(|p| p.username.clone()),
        auth_type: principal.as_ref().map(|p| p.kind.as_str().to_string()),
        status_code: response.status().as_u16(),
        duration_ms: started_at.elapsed().as_millis() as i64,
        metadata: None,
    };

    let state = state.clone();
    state.task_tracker.spawn(async move {
        dispatch(&state, record).await;
    });

    response
}

async fn dispatch(state: &AppState, record: AuditLog) {
    let audit = &state.config.audit;

    if audit.db_enabled
        && let Some(db) = &state.db
        && let Err(err) = db.audit_logs().record(record.clone()).await
    {
        tracing::warn!(error = %err, "failed to persist audit log record");
    }

    if let Some(print) = &audit.forwarders.print {
        print_record(print, &record);
    }

    for http in &audit.forwarders.http {
        if let Err(err) = forward_http(http, &record).await {
            tracing::warn!(url = %http.url, error = %err, "audit forwarder delivery failed");
        }
    }
}

fn print_record(config: &PrintForwarderConfig, record: &AuditLog) {
    let body = serde_json::to_string(record).unwrap_or_default();
    match config.level {
        AuditLogLevel::Debug => tracing::debug!(audit = %body, "audit record"),
        AuditLogLevel::Info => tracing::info!(audit = %body, "audit record"),
        AuditLogLevel::Warn => tracing::warn!(audit = %body, "audit record"),
    }
}

async fn forward_http(config: &HttpForwarderConfig, record: &AuditLog) -> Result<(), String> {
    let tls = config.tls.load().map_err(|e| e.to_string())?;
    let client = ClientFactory::build(
        &config.url,
        &Default::default(),
        &ClientFactoryOptions { proxy_url: None, tls },
    )
    .map_err(|e| e.to_string())?;

    let body = serde_json::to_vec(record).map_err(|e| e.to_string())?;
    let policy = config.retry_policy();

    with_retry(&policy, "audit_forwarder", "forward", || async {
        let mut builder = client.post(&config.url).body(body.clone());
        for (name, value) in &config.headers {
            builder = builder.header(name, value);
        }
        builder.send().await.map_err(ProviderRequestError::Request)
    })
    .await
    .map_err(|e| e.to_string())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_level_does_not_panic() {
        let record = AuditLog {
            id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            method: "GET".into(),
            path: "/v1/models".into(),
            user: Some("alice".into()),
            auth_type: Some("api_key".into()),
            status_code: 200,
            duration_ms: 5,
            metadata: None,
        };
        print_record(
            &PrintForwarderConfig {
                level: AuditLogLevel::Info,
            },
            &record,
        );
    }
}
