//! The authenticated caller.
//!
//! Unifies API-key and JWT authentication into one type carrying id,
//! username, credential kind, and group names, so the rest of the gateway
//! (catalog access checks, audit log, token usage ledger) never needs to
//! know which credential produced the principal.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    db::DbPool,
    models::{API_KEY_PREFIX, User},
};

use super::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalKind {
    ApiKey,
    Jwt,
}

impl PrincipalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalKind::ApiKey => "api_key",
            PrincipalKind::Jwt => "jwt",
        }
    }
}

/// The authenticated caller for one request (GLOSSARY "Principal").
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub kind: PrincipalKind,
    pub groups: Vec<String>,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.groups.iter().any(|g| g == "admin")
    }
}

/// Hex-encoded SHA-256 digest of an API key's plaintext, as stored in
/// [`crate::models::ApiKey::key_hash`].
pub fn hash_api_key(plaintext: &str) -> String {
    let digest = Sha256::digest(plaintext.as_bytes());
    hex::encode(digest)
}

/// Generate a fresh `sk-`-prefixed API key. Returns `(plaintext, key_hash)`;
/// the plaintext is shown to the caller exactly once and never persisted.
pub fn generate_api_key() -> (String, String) {
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let plaintext = format!("{API_KEY_PREFIX}{}", hex::encode(bytes));
    let key_hash = hash_api_key(&plaintext);
    (plaintext, key_hash)
}

/// Resolve an `sk-...` API key (optionally prefixed with `Bearer `) to a
/// principal. Updates `last_used_at` on success.
pub async fn resolve_api_key_principal(db: &DbPool, token: &str) -> Result<Principal, AuthError> {
    let key_hash = hash_api_key(token);

    let api_key = db
        .api_keys()
        .get_by_hash(&key_hash)
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?
        .ok_or(AuthError::InvalidCredentials)?;

    if !api_key.is_valid(chrono::Utc::now()) {
        return Err(AuthError::InvalidCredentials);
    }

    let user = db
        .users()
        .get_by_id(api_key.user_id)
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?
        .ok_or(AuthError::InvalidCredentials)?;

    if !user.is_active {
        return Err(AuthError::InvalidCredentials);
    }

    let _ = db.api_keys().touch_last_used(api_key.id).await;

    Ok(Principal {
        id: user.id,
        username: user.username,
        kind: PrincipalKind::ApiKey,
        groups: user.groups,
    })
}

/// One entry of the JWT principal cache, keyed by username.
#[derive(Debug, Clone)]
pub struct CachedPrincipal {
    pub groups: Vec<String>,
    cached_at: Instant,
}

/// Process-wide TTL cache of JWT-resolved principals, keyed by username
/// Best-effort:
/// a single-node, read-after-write-per-username map, not a distributed
/// cache.
#[derive(Debug, Default)]
pub struct PrincipalCache {
    entries: DashMap<String, CachedPrincipal>,
}

impl PrincipalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, username: &str, ttl: Duration) -> Option<Vec<String>> {
        let entry = self.entries.get(username)?;
        if entry.cached_at.elapsed() > ttl {
            drop(entry);
            self.entries.remove(username);
            return None;
        }
        Some(entry.groups.clone())
    }

    pub fn insert(&self, username: String, groups: Vec<String>) {
        self.entries.insert(
            username,
            CachedPrincipal {
                groups,
                cached_at: Instant::now(),
            },
        );
    }

    /// Evict a single username, as driven by `whoami?force_cache_clear=true`.
    pub fn evict(&self, username: &str) {
        self.entries.remove(username);
    }
}

/// JIT-provision (or fetch) the `User` row backing a JWT principal, preferring
/// the stored row's groups over the token's own claims.
pub async fn jit_provision_user(
    db: &DbPool,
    username: &str,
    claimed_groups: Vec<String>,
) -> Result<User, AuthError> {
    db.users()
        .get_or_create_by_username(username, &claimed_groups)
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))
}
