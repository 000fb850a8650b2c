//! Authentication: API keys and JWTs unified into one [`Principal`].

mod error;
pub mod jwt;
mod principal;

pub use error::AuthError;
pub use jwt::{JwtValidator, SharedJwtValidator, extract_groups, extract_username};
pub use principal::{
    CachedPrincipal, Principal, PrincipalCache, PrincipalKind, generate_api_key, hash_api_key,
    jit_provision_user, resolve_api_key_principal,
};

use axum::{
    extract::{FromRef, FromRequestParts, Query},
    http::request::Parts,
};
use serde::Deserialize;

use crate::models::API_KEY_PREFIX;

/// Strip an optional `Bearer ` prefix from an `Authorization` header value.
fn bearer_token(header: &str) -> &str {
    header.strip_prefix("Bearer ").unwrap_or(header).trim()
}

/// Resolve the `Authorization` header into a [`Principal`]: an
/// `sk-`-prefixed token (optionally `Bearer`-prefixed) is an API key,
/// anything else is validated as a JWT against the configured JWKS.
pub async fn resolve_principal(
    state: &AuthState,
    authorization: Option<&str>,
) -> Result<Principal, AuthError> {
    let header = authorization.ok_or(AuthError::MissingCredentials)?;
    let token = bearer_token(header);
    if token.is_empty() {
        return Err(AuthError::MissingCredentials);
    }

    let db = state.db.as_ref().ok_or_else(|| {
        AuthError::Internal("authentication requires a configured database".to_string())
    })?;

    if token.starts_with(API_KEY_PREFIX) {
        return resolve_api_key_principal(db, token).await;
    }

    let validator = state
        .jwt_validator
        .as_ref()
        .ok_or(AuthError::InvalidToken)?;
    let claims = validator.validate(token).await?;

    let username = extract_username(&claims, validator.config().identity_claim.as_deref())
        .ok_or(AuthError::InvalidCredentials)?;
    let claimed_groups = extract_groups(&claims);

    let ttl = validator.config().jwks_cache_ttl();
    let groups = match state.principal_cache.get(&username, ttl) {
        Some(groups) => groups,
        None => {
            let user = jit_provision_user(db, &username, claimed_groups).await?;
            state.principal_cache.insert(username.clone(), user.groups.clone());
            user.groups
        }
    };

    let user = db
        .users()
        .get_by_username(&username)
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?
        .ok_or(AuthError::InvalidCredentials)?;

    if !user.is_active {
        return Err(AuthError::InvalidCredentials);
    }

    Ok(Principal {
        id: user.id,
        username,
        kind: PrincipalKind::Jwt,
        groups,
    })
}

/// The slice of `AppState` the auth resolver needs, extracted via
/// [`FromRef`] so handlers don't need the whole application state in scope.
#[derive(Clone)]
pub struct AuthState {
    pub db: Option<std::sync::Arc<crate::db::DbPool>>,
    pub jwt_validator: Option<SharedJwtValidator>,
    pub principal_cache: std::sync::Arc<PrincipalCache>,
}

#[derive(Debug, Deserialize)]
struct ForceCacheClear {
    #[serde(default)]
    force_cache_clear: bool,
}

impl<S> FromRequestParts<S> for Principal
where
    AuthState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let principal = resolve_principal(&auth_state, header).await?;

        // `whoami?force_cache_clear=true` evicts the caller's own cached
        // group membership so the next request re-reads the database.
        if let Ok(Query(q)) = Query::<ForceCacheClear>::try_from_uri(&parts.uri)
            && q.force_cache_clear
        {
            auth_state.principal_cache.evict(&principal.username);
        }

        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_prefix_is_stripped() {
        assert_eq!(bearer_token("Bearer sk-abc"), "sk-abc");
        assert_eq!(bearer_token("sk-abc"), "sk-abc");
    }
}
