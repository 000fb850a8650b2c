use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{
        error::DbResult,
        repos::{ApiKeyRepo, Cursor, ListParams, ListResult, PageCursors, cursor_from_row},
    },
    models::{ApiKey, CreateApiKey},
};

pub struct SqliteApiKeyRepo {
    pool: SqlitePool,
}

impl SqliteApiKeyRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_row(row: &sqlx::sqlite::SqliteRow) -> DbResult<ApiKey> {
        Ok(ApiKey {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            key_hash: row.get("key_hash"),
            name: row.get("name"),
            user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
            created_at: row.get("created_at"),
            expires_at: row.get("expires_at"),
            is_active: row.get("is_active"),
            last_used_at: row.get("last_used_at"),
        })
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
            WHERE user_id = ? AND (created_at, id) {comparison} (?, ?)
            ORDER BY created_at {order}, id {order}
            LIMIT ?
            "#
        );
        let rows = sqlx::query(&query)
            .bind(user_id.to_string())
            .bind(cursor.created_at)
            .bind(cursor.id.to_string())
            .bind(fetch_limit)
            .fetch_all(&self.pool)
            .await?;

        let has_more = rows.len() as i64 > limit;
        let mut items = rows
            .iter()
            .take(limit as usize)
            .map(Self::parse_row)
            .collect::<DbResult<Vec<_>>>()?;
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
impl ApiKeyRepo for SqliteApiKeyRepo {
    async fn create(&self, user_id: Uuid, input: CreateApiKey, key_hash: &str) -> DbResult<ApiKey> {
        let now = Utc::now();
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO api_keys (id, key_hash, name, user_id, created_at, expires_at, is_active, last_used_at)
            VALUES (?, ?, ?, ?, ?, ?, TRUE, NULL)
            "#,
        )
        .bind(id.to_string())
        .bind(key_hash)
        .bind(&input.name)
        .bind(user_id.to_string())
        .bind(now)
        .bind(input.expires_at)
        .execute(&self.pool)
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
            "SELECT id, key_hash, name, user_id, created_at, expires_at, is_active, last_used_at FROM api_keys WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn get_by_hash(&self, key_hash: &str) -> DbResult<Option<ApiKey>> {
        let row = sqlx::query(
            "SELECT id, key_hash, name, user_id, created_at, expires_at, is_active, last_used_at FROM api_keys WHERE key_hash = ?",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::parse_row).transpose()
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
            FROM api_keys WHERE user_id = ? ORDER BY created_at {order}, id {order} LIMIT ?
            "#
        );
        let rows = sqlx::query(&query)
            .bind(user_id.to_string())
            .bind(limit + 1)
            .fetch_all(&self.pool)
            .await?;

        let has_more = rows.len() as i64 > limit;
        let items = rows
            .iter()
            .take(limit as usize)
            .map(Self::parse_row)
            .collect::<DbResult<Vec<_>>>()?;

        let cursors = PageCursors::from_items(&items, has_more, params.direction, None, |k| {
            cursor_from_row(k.created_at, k.id)
        });
        Ok(ListResult::new(items, has_more, cursors))
    }

    async fn revoke(&self, id: Uuid) -> DbResult<()> {
        let result = sqlx::query("UPDATE api_keys SET is_active = FALSE WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(crate::db::error::DbError::NotFound);
        }
        Ok(())
    }

    async fn touch_last_used(&self, id: Uuid) -> DbResult<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
