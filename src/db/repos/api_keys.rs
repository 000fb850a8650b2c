use async_trait::async_trait;
use uuid::Uuid;

use super::{ListParams, ListResult};
use crate::{
    db::error::DbResult,
    models::{ApiKey, CreateApiKey},
};

#[async_trait]
pub trait ApiKeyRepo: Send + Sync {
    /// `key_hash` is the SHA-256 hex digest of the plaintext; the plaintext
    /// itself is never passed to the repository layer.
    async fn create(&self, user_id: Uuid, input: CreateApiKey, key_hash: &str) -> DbResult<ApiKey>;
    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<ApiKey>>;
    async fn get_by_hash(&self, key_hash: &str) -> DbResult<Option<ApiKey>>;
    async fn list_by_user(&self, user_id: Uuid, params: ListParams) -> DbResult<ListResult<ApiKey>>;
    async fn revoke(&self, id: Uuid) -> DbResult<()>;
    async fn touch_last_used(&self, id: Uuid) -> DbResult<()>;
}
