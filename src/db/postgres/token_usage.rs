use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{
    db::{
        error::DbResult,
        repos::{Cursor, ListParams, ListResult, PageCursors, TokenUsageRepo, TokenUsageTotals, cursor_from_row},
    },
    models::TokenUsage,
};

pub struct PostgresTokenUsageRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresTokenUsageRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn parse_row(row: &sqlx::postgres::PgRow) -> TokenUsage {
        TokenUsage {
            id: row.get("id"),
            user_id: row.get("user_id"),
            model: row.get("model"),
            prompt_tokens: row.get("prompt_tokens"),
            completion_tokens: row.get("completion_tokens"),
            total_tokens: row.get("total_tokens"),
            timestamp: row.get("timestamp"),
            request_id: row.get("request_id"),
            endpoint: row.get("endpoint"),
        }
    }

    async fn list_with_cursor(
        &self,
        user_id: Uuid,
        params: &ListParams,
        cursor: &Cursor,
        fetch_limit: i64,
        limit: i64,
    ) -> DbResult<ListResult<TokenUsage>> {
        let (comparison, order, should_reverse) =
            params.sort_order.cursor_query_params(params.direction);
        let query = format!(
            r#"
            SELECT id, user_id, model, prompt_tokens, completion_tokens, total_tokens, timestamp, request_id, endpoint
            FROM token_usages
            WHERE user_id = $1 AND ROW(timestamp, id) {comparison} ROW($2, $3)
            ORDER BY timestamp {order}, id {order}
            LIMIT $4
            "#
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(cursor.created_at)
            .bind(cursor.id)
            .bind(fetch_limit)
            .fetch_all(&self.read_pool)
            .await?;

        let has_more = rows.len() as i64 > limit;
        let mut items: Vec<TokenUsage> =
            rows.iter().take(limit as usize).map(Self::parse_row).collect();
        if should_reverse {
            items.reverse();
        }
        let cursors =
            PageCursors::from_items(&items, has_more, params.direction, Some(cursor), |u| {
                cursor_from_row(u.timestamp, u.id)
            });
        Ok(ListResult::new(items, has_more, cursors))
    }
}

#[async_trait]
impl TokenUsageRepo for PostgresTokenUsageRepo {
    async fn record(&self, usage: TokenUsage) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO token_usages (id, user_id, model, prompt_tokens, completion_tokens, total_tokens, timestamp, request_id, endpoint)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(usage.id)
        .bind(usage.user_id)
        .bind(&usage.model)
        .bind(usage.prompt_tokens)
        .bind(usage.completion_tokens)
        .bind(usage.total_tokens)
        .bind(usage.timestamp)
        .bind(usage.request_id)
        .bind(&usage.endpoint)
        .execute(&self.write_pool)
        .await?;
        Ok(())
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        params: ListParams,
    ) -> DbResult<ListResult<TokenUsage>> {
        let limit = params.limit.unwrap_or(50).clamp(1, 500);

        if let Some(cursor) = &params.cursor {
            return self
                .list_with_cursor(user_id, &params, cursor, limit + 1, limit)
                .await;
        }

        let order = params.sort_order.as_sql();
        let query = format!(
            r#"
            SELECT id, user_id, model, prompt_tokens, completion_tokens, total_tokens, timestamp, request_id, endpoint
            FROM token_usages WHERE user_id = $1 ORDER BY timestamp {order}, id {order} LIMIT $2
            "#
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(limit + 1)
            .fetch_all(&self.read_pool)
            .await?;

        let has_more = rows.len() as i64 > limit;
        let items: Vec<TokenUsage> =
            rows.iter().take(limit as usize).map(Self::parse_row).collect();

        let cursors = PageCursors::from_items(&items, has_more, params.direction, None, |u| {
            cursor_from_row(u.timestamp, u.id)
        });
        Ok(ListResult::new(items, has_more, cursors))
    }

    async fn sum_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> DbResult<TokenUsageTotals> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(prompt_tokens), 0)::BIGINT AS prompt_tokens,
                COALESCE(SUM(completion_tokens), 0)::BIGINT AS completion_tokens,
                COALESCE(SUM(total_tokens), 0)::BIGINT AS total_tokens,
                COUNT(*) AS request_count
            FROM token_usages
            WHERE user_id = $1 AND timestamp >= $2 AND timestamp < $3
            "#,
        )
        .bind(user_id)
        .bind(since)
        .bind(until)
        .fetch_one(&self.read_pool)
        .await?;

        Ok(TokenUsageTotals {
            prompt_tokens: row.get("prompt_tokens"),
            completion_tokens: row.get("completion_tokens"),
            total_tokens: row.get("total_tokens"),
            request_count: row.get("request_count"),
        })
    }
}
