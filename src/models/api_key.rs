use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A credential that authenticates as its owning [`crate::models::User`].
/// Plaintext keys are never stored; `key_hash` is the hex-encoded SHA-256
/// digest of the plaintext, and is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub key_hash: String,
    pub name: Option<String>,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// A key is valid iff active and unexpired; validity of the owning user
    /// is a separate check made by the repository/resolver.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map(|exp| exp > now).unwrap_or(true)
    }
}

/// Returned exactly once, at creation time, carrying the plaintext secret.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyWithSecret {
    #[serde(flatten)]
    pub key: ApiKey,
    pub plaintext: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateApiKey {
    #[validate(length(max = 255))]
    pub name: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Prefix every plaintext key carries, per the auth resolver's matching rule
/// (`sk-…`, optionally preceded by `Bearer `).
pub const API_KEY_PREFIX: &str = "sk-";
