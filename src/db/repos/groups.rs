use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{CreateGroup, Group, UpdateGroup},
};

#[async_trait]
pub trait GroupRepo: Send + Sync {
    async fn create(&self, input: CreateGroup) -> DbResult<Group>;
    async fn get_by_id(&self, id: i64) -> DbResult<Option<Group>>;
    async fn get_by_name(&self, name: &str) -> DbResult<Option<Group>>;
    async fn list(&self) -> DbResult<Vec<Group>>;
    async fn update(&self, id: i64, input: UpdateGroup) -> DbResult<Group>;
    async fn delete(&self, id: i64) -> DbResult<()>;
}
