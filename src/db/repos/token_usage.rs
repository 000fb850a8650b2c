use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{ListParams, ListResult};
use crate::{db::error::DbResult, models::TokenUsage};

#[async_trait]
pub trait TokenUsageRepo: Send + Sync {
    async fn record(&self, usage: TokenUsage) -> DbResult<()>;
    async fn list_by_user(
        &self,
        user_id: Uuid,
        params: ListParams,
    ) -> DbResult<ListResult<TokenUsage>>;

    /// Sum of prompt/completion/total tokens for `user_id` within
    /// `[since, until)`, used by the admin usage summary endpoint.
    async fn sum_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> DbResult<TokenUsageTotals>;
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct TokenUsageTotals {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub request_count: i64,
}
