use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{
    db::{
        error::DbResult,
        repos::{ApiKeyRepo, Cursor, ListParams, ListResult, PageCursors, cursor_from_row},
    },
    models::{ApiKey, CreateApiKey},
};

pub struct PostgresApiKeyRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresApiKeyRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn parse_row(row: &sqlx::postgres::PgRow) -> ApiKey {
        ApiKey {
            id: row.get("id"),
            key_hash: row.get("key_hash"),
            name: row.get("name"),
            user_id: row.get("user_id"),
            created_at: row.get("created_at"),
            expires_at: row.get("expires_at"),
            is_active: row.get("is_active"),
            last_used_at: row.get("last_used_at"),
        }
    }

    async fn list_with_cursor(
        &self,
        user_id: Uuid,
        params: &ListParams,
        cursor: &Cursor,
        fetch_limit: i64,
        limit: i64,
    ) -> DbResult<ListResult<ApiKey>> {
        let (comparison, order, should_reverse) =
            params.sort_order.cursor_query_params(params.direction);
        let query = format!(
            r#"
            SELECT id, key_hash, name, user_id, created_at, expires_at, is_active, last_used_at
            FROM api_keys
            WHERE user_id = $1 AND ROW(created_at, id) {comparison} ROW($2, $3)
            ORDER BY created_at {order}, id {order}
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
        let mut items: Vec<ApiKey> = rows.iter().take(limit as usize).map(Self::parse_row).collect();
        if should_reverse {
            items.reverse();
        }
        let cursors =
            PageCursors::from_items(&items, has_more, params.direction, Some(cursor), |k| {
                cursor_from_row(k.created_at, k.id)
            });
        Ok(ListResult::new(items, has_more, cursors))
    }
}

#[async_trait]
impl ApiKeyRepo for PostgresApiKeyRepo {
    async fn create(&self, user_id: Uuid, input: CreateApiKey, key_hash: &str) -> DbResult<ApiKey> {
        let now = Utc::now();
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO api_keys (id, key_hash, name, user_id, created_at, expires_at, is_active, last_used_at)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, NULL)
            "#,
        )
        .bind(id)
        .bind(key_hash)
        .bind(&input.name)
        .bind(user_id)
        .bind(now)
        .bind(input.expires_at)
        .execute(&self.write_pool)
        .await?;

        Ok(ApiKey {
            id,
            key_hash: key_hash.to_string(),
            name: input.name,
            user_id,
            created_at: now,
            expires_at: input.expires_at,
            is_active: true,
            last_used_at: None,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<ApiKey>> {
        let row = sqlx::query(
            "SELECT id, key_hash, name, user_id, created_at, expires_at, is_active, last_used_at FROM api_keys WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.read_pool)
        .await?;
        Ok(row.as_ref().map(Self::parse_row))
    }

    async fn get_by_hash(&self, key_hash: &str) -> DbResult<Option<ApiKey>> {
        let row = sqlx::query(
            "SELECT id, key_hash, name, user_id, created_at, expires_at, is_active, last_used_at FROM api_keys WHERE key_hash = $1",
        )
        .bind(key_hash)
        .fetch_optional(&self.read_pool)
        .await?;
        Ok(row.as_ref().map(Self::parse_row))
    }

    async fn list_by_user(&self, user_id: Uuid, params: ListParams) -> DbResult<ListResult<ApiKey>> {
        let limit = params.limit.unwrap_or(50).clamp(1, 500);

        if let Some(cursor) = &params.cursor {
            return self
                .list_with_cursor(user_id, &params, cursor, limit + 1, limit)
                .await;
        }

        let order = params.sort_order.as_sql();
        let query = format!(
            r#"
            SELECT id, key_hash, name, user_id, created_at, expires_at, is_active, last_used_at
            FROM api_keys WHERE user_id = $1 ORDER BY created_at {order}, id {order} LIMIT $2
            "#
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(limit + 1)
            .fetch_all(&self.read_pool)
            .await?;

        let has_more = rows.len() as i64 > limit;
        let items: Vec<ApiKey> = rows.iter().take(limit as usize).map(Self::parse_row).collect();

        let cursors = PageCursors::from_items(&items, has_more, params.direction, None, |k| {
            cursor_from_row(k.created_at, k.id)
        });
        Ok(ListResult::new(items, has_more, cursors))
    }

    async fn revoke(&self, id: Uuid) -> DbResult<()> {
        let result = sqlx::query("UPDATE api_keys SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.write_pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(crate::db::error::DbError::NotFound);
        }
        Ok(())
    }

    async fn touch_last_used(&self, id: Uuid) -> DbResult<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.write_pool)
            .await?;
        Ok(())
    }
}
