//! JWT validation against a JWKS endpoint, with TTL-cached keys.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use jsonwebtoken::{
    Algorithm, DecodingKey, TokenData, Validation, decode, decode_header,
    jwk::{AlgorithmParameters, Jwk, JwkSet},
};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::{
    config::auth::JwtAuthConfig,
    providers::retry::{ProviderRequestError, keycloak_jwks_retry_policy, with_retry},
};

use super::AuthError;

/// Claims extracted from a validated JWT. Only `sub`/`iss`/`exp` are given
/// names; everything else (including the identity/groups claims, whose
/// names vary by issuer) is read out of `extra`.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub exp: u64,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// Extract the caller's username: `identity_claim` when
/// configured, otherwise `preferred_username | username | name | sub` in
/// that order. An empty string at every step is treated as "absent"
/// Open Question: an empty username never authenticates).
pub fn extract_username(claims: &JwtClaims, identity_claim: Option<&str>) -> Option<String> {
    if let Some(claim) = identity_claim {
        return claims
            .extra
            .get(claim)
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|s| !s.is_empty());
    }

    for key in ["preferred_username", "username", "name"] {
        if let Some(value) = claims.extra.get(key).and_then(Value::as_str)
            && !value.is_empty()
        {
            return Some(value.to_string());
        }
    }

    (!claims.sub.is_empty()).then(|| claims.sub.clone())
}

/// Union of `groups`, `realm_access.roles`, and every client entry under
/// `resource_access.*.roles`, deduplicated.
pub fn extract_groups(claims: &JwtClaims) -> Vec<String> {
    let mut groups = Vec::new();

    if let Some(arr) = claims.extra.get("groups").and_then(Value::as_array) {
        groups.extend(arr.iter().filter_map(|v| v.as_str().map(String::from)));
    }

    if let Some(roles) = claims
        .extra
        .get("realm_access")
        .and_then(|v| v.get("roles"))
        .and_then(Value::as_array)
    {
        groups.extend(roles.iter().filter_map(|v| v.as_str().map(String::from)));
    }

    if let Some(resource_access) = claims.extra.get("resource_access").and_then(Value::as_object) {
        for client in resource_access.values() {
            if let Some(roles) = client.get("roles").and_then(Value::as_array) {
                groups.extend(roles.iter().filter_map(|v| v.as_str().map(String::from)));
            }
        }
    }

    groups.sort();
    groups.dedup();
    groups
}

struct CachedJwks {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

/// Fetches and caches a JWKS, validating tokens against it.
pub struct JwtValidator {
    config: JwtAuthConfig,
    http_client: reqwest::Client,
    jwks_cache: RwLock<Option<CachedJwks>>,
}

impl JwtValidator {
    pub fn new(config: JwtAuthConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
            jwks_cache: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &JwtAuthConfig {
        &self.config
    }

    /// Validate a JWT and return its claims.
    pub async fn validate(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let header = decode_header(token).map_err(|e| {
            tracing::debug!(error = %e, "failed to decode JWT header");
            AuthError::InvalidToken
        })?;

        if !self.is_algorithm_allowed(header.alg) {
            tracing::warn!(algorithm = ?header.alg, "JWT algorithm not in allowlist");
            return Err(AuthError::InvalidToken);
        }

        let kid = header.kid.as_deref().ok_or(AuthError::InvalidToken)?;
        let decoding_key = self.get_decoding_key(kid).await?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[&self.config.issuer]);
        if let Some(audience) = &self.config.audience {
            let aud_refs = audience.as_slice();
            validation.set_audience(&aud_refs);
        } else {
            validation.validate_aud = false;
        }
        if self.config.allow_expired {
            validation.validate_exp = false;
        }

        let token_data: TokenData<JwtClaims> = decode(token, &decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "JWT validation failed");
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                    _ => AuthError::InvalidToken,
                }
            })?;

        Ok(token_data.claims)
    }

    fn is_algorithm_allowed(&self, alg: Algorithm) -> bool {
        self.config.allowed_algorithms.iter().any(|a| a.matches(alg))
    }

    async fn get_decoding_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        {
            let cache = self.jwks_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                let refresh = Duration::from_secs(self.config.jwks_refresh_secs);
                if cached.fetched_at.elapsed() < refresh
                    && let Some(key) = cached.keys.get(kid)
                {
                    return Ok(key.clone());
                }
            }
        }

        if let Err(e) = self.refresh_jwks().await {
            let cache = self.jwks_cache.read().await;
            if let Some(cached) = cache.as_ref()
                && let Some(key) = cached.keys.get(kid)
            {
                tracing::warn!("JWKS refresh failed, using stale cached key: {e}");
                return Ok(key.clone());
            }
            return Err(e);
        }

        let cache = self.jwks_cache.read().await;
        cache
            .as_ref()
            .and_then(|c| c.keys.get(kid).cloned())
            .ok_or(AuthError::InvalidToken)
    }

    /// Fetch and cache the JWKS, retried per [`keycloak_jwks_retry_policy`].
    async fn refresh_jwks(&self) -> Result<(), AuthError> {
        let policy = keycloak_jwks_retry_policy();
        let response = with_retry(&policy, "jwt", "jwks_fetch", || async {
            self.http_client
                .get(&self.config.jwks_url)
                .send()
                .await
                .map_err(ProviderRequestError::Request)
        })
        .await
        .map_err(|e| AuthError::Internal(format!("failed to fetch JWKS: {e}")))?;

        if !response.status().is_success() {
            return Err(AuthError::Internal(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::Internal(format!("failed to parse JWKS: {e}")))?;

        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            if let Some(kid) = &jwk.common.key_id {
                match jwk_to_decoding_key(&jwk) {
                    Ok(key) => {
                        keys.insert(kid.clone(), key);
                    }
                    Err(e) => tracing::warn!(kid, %e, "failed to convert JWK"),
                }
            }
        }

        tracing::info!(keys_count = keys.len(), "JWKS refreshed");
        *self.jwks_cache.write().await = Some(CachedJwks {
            keys,
            fetched_at: Instant::now(),
        });
        Ok(())
    }
}

fn jwk_to_decoding_key(jwk: &Jwk) -> Result<DecodingKey, AuthError> {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
            .map_err(|e| AuthError::Internal(format!("invalid RSA JWK: {e}"))),
        AlgorithmParameters::OctetKey(oct) => DecodingKey::from_base64_secret(&oct.value)
            .map_err(|e| AuthError::Internal(format!("invalid HMAC JWK: {e}"))),
        _ => Err(AuthError::Internal("unsupported JWK key type".to_string())),
    }
}

pub type SharedJwtValidator = Arc<JwtValidator>;

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(extra: serde_json::Value) -> JwtClaims {
        JwtClaims {
            sub: "user-123".to_string(),
            iss: "https://idp.example.com".to_string(),
            exp: 0,
            extra: serde_json::from_value(extra).unwrap(),
        }
    }

    #[test]
    fn username_prefers_preferred_username() {
        let c = claims(serde_json::json!({"preferred_username": "alice", "name": "Alice Smith"}));
        assert_eq!(extract_username(&c, None), Some("alice".to_string()));
    }

    #[test]
    fn username_falls_back_to_sub() {
        let c = claims(serde_json::json!({}));
        assert_eq!(extract_username(&c, None), Some("user-123".to_string()));
    }

    #[test]
    fn empty_username_is_rejected_even_with_sub_present() {
        let c = claims(serde_json::json!({"preferred_username": ""}));
        assert_eq!(extract_username(&c, None), Some("user-123".to_string()));
    }

    #[test]
    fn identity_claim_override_is_used_when_configured() {
        let c = claims(serde_json::json!({"email": "alice@example.com", "preferred_username": "alice"}));
        assert_eq!(extract_username(&c, Some("email")), Some("alice@example.com".to_string()));
    }

    #[test]
    fn groups_union_realm_and_resource_roles() {
        let c = claims(serde_json::json!({
            "groups": ["g1"],
            "realm_access": {"roles": ["admin"]},
            "resource_access": {"my-client": {"roles": ["g1", "editor"]}}
        }));
        let groups = extract_groups(&c);
        assert_eq!(groups, vec!["admin", "editor", "g1"]);
    }
}
