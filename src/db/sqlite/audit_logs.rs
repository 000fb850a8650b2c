use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::common::parse_uuid;
use crate::{
    db::{
        error::DbResult,
        repos::{AuditLogRepo, Cursor, ListParams, ListResult, PageCursors, cursor_from_row},
    },
    models::AuditLog,
};

pub struct SqliteAuditLogRepo {
    pool: SqlitePool,
}

impl SqliteAuditLogRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_row(row: &sqlx::sqlite::SqliteRow) -> DbResult<AuditLog> {
        let metadata: Option<String> = row.get("metadata");
        Ok(AuditLog {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            timestamp: row.get("timestamp"),
            method: row.get("method"),
            path: row.get("path"),
            user: row.get("user"),
            auth_type: row.get("auth_type"),
            status_code: row.get::<i64, _>("status_code") as u16,
            duration_ms: row.get("duration_ms"),
            metadata: metadata.map(|m| serde_json::from_str(&m)).transpose()?,
        })
    }

    async fn list_with_cursor(
        &self,
        params: &ListParams,
        cursor: &Cursor,
        fetch_limit: i64,
        limit: i64,
    ) -> DbResult<ListResult<AuditLog>> {
        let (comparison, order, should_reverse) =
            params.sort_order.cursor_query_params(params.direction);
        let query = format!(
            r#"
            SELECT id, timestamp, method, path, user, auth_type, status_code, duration_ms, metadata
            FROM audit_logs
            WHERE (timestamp, id) {comparison} (?, ?)
            ORDER BY timestamp {order}, id {order}
            LIMIT ?
            "#
        );
        let rows = sqlx::query(&query)
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
            PageCursors::from_items(&items, has_more, params.direction, Some(cursor), |l| {
                cursor_from_row(l.timestamp, l.id)
            });
        Ok(ListResult::new(items, has_more, cursors))
    }
}

#[async_trait]
impl AuditLogRepo for SqliteAuditLogRepo {
    async fn record(&self, entry: AuditLog) -> DbResult<()> {
        let metadata_json = entry.metadata.as_ref().map(serde_json::to_string).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, timestamp, method, path, user, auth_type, status_code, duration_ms, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.timestamp)
        .bind(&entry.method)
        .bind(&entry.path)
        .bind(&entry.user)
        .bind(&entry.auth_type)
        .bind(entry.status_code as i64)
        .bind(entry.duration_ms)
        .bind(&metadata_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, params: ListParams) -> DbResult<ListResult<AuditLog>> {
        let limit = params.limit.unwrap_or(50).clamp(1, 500);

        if let Some(cursor) = &params.cursor {
            return self.list_with_cursor(&params, cursor, limit + 1, limit).await;
        }

        let order = params.sort_order.as_sql();
        let query = format!(
            r#"
            SELECT id, timestamp, method, path, user, auth_type, status_code, duration_ms, metadata
            FROM audit_logs ORDER BY timestamp {order}, id {order} LIMIT ?
            "#
        );
        let rows = sqlx::query(&query)
            .bind(limit + 1)
            .fetch_all(&self.pool)
            .await?;

        let has_more = rows.len() as i64 > limit;
        let items = rows
            .iter()
            .take(limit as usize)
            .map(Self::parse_row)
            .collect::<DbResult<Vec<_>>>()?;

        let cursors = PageCursors::from_items(&items, has_more, params.direction, None, |l| {
            cursor_from_row(l.timestamp, l.id)
        });
        Ok(ListResult::new(items, has_more, cursors))
    }
}
