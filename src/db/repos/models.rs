use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{CreateModel, Model, ModelStatus, UpdateModel},
};

#[async_trait]
pub trait ModelRepo: Send + Sync {
    async fn create(&self, input: CreateModel) -> DbResult<Model>;
    async fn get_by_id(&self, id: i64) -> DbResult<Option<Model>>;
    async fn get_by_technical_name(&self, technical_name: &str) -> DbResult<Option<Model>>;
    async fn list(&self) -> DbResult<Vec<Model>>;
    async fn list_by_status(&self, status: ModelStatus) -> DbResult<Vec<Model>>;
    async fn update(&self, id: i64, input: UpdateModel) -> DbResult<Model>;
    async fn set_status(&self, id: i64, status: ModelStatus) -> DbResult<Model>;

    /// Models reachable by `group_name` through `model_authorization`, restricted
    /// to `ModelStatus::Approved`. This is the query the catalog's access
    /// resolution builds on.
    async fn list_approved_for_groups(&self, group_names: &[String]) -> DbResult<Vec<Model>>;

    async fn authorize_group(&self, model_id: i64, group_id: i64) -> DbResult<()>;
    async fn revoke_group(&self, model_id: i64, group_id: i64) -> DbResult<()>;
    async fn list_authorized_groups(&self, model_id: i64) -> DbResult<Vec<i64>>;
}
