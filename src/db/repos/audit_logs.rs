use async_trait::async_trait;

use super::{ListParams, ListResult};
use crate::{db::error::DbResult, models::AuditLog};

#[async_trait]
pub trait AuditLogRepo: Send + Sync {
    async fn record(&self, entry: AuditLog) -> DbResult<()>;
    async fn list(&self, params: ListParams) -> DbResult<ListResult<AuditLog>>;
}
