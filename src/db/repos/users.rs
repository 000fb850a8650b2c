use async_trait::async_trait;
use uuid::Uuid;

use super::{ListParams, ListResult};
use crate::{
    db::error::DbResult,
    models::{CreateUser, UpdateUser, User},
};

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create(&self, input: CreateUser) -> DbResult<User>;
    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<User>>;
    async fn get_by_username(&self, username: &str) -> DbResult<Option<User>>;
    async fn list(&self, params: ListParams) -> DbResult<ListResult<User>>;
    async fn count(&self) -> DbResult<i64>;
    async fn update(&self, id: Uuid, input: UpdateUser) -> DbResult<User>;
    async fn deactivate(&self, id: Uuid) -> DbResult<()>;

    /// Find or create a user by username, used by the JWT auth path for
    /// just-in-time provisioning on first login.
    async fn get_or_create_by_username(
        &self,
        username: &str,
        groups: &[String],
    ) -> DbResult<User>;
}
