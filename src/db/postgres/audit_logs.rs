use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::{
    db::{
        error::DbResult,
        repos::{AuditLogRepo, Cursor, ListParams, ListResult, PageCursors, cursor_from_row},
    },
    models::AuditLog,
};

pub struct PostgresAuditLogRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresAuditLogRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn parse_row(row: &sqlx::postgres::PgRow) -> DbResult<AuditLog> {
        let metadata: Option<serde_json::Value> = row.get("metadata");
        Ok(AuditLog {
            id: row.get("id"),
            timestamp: row.get("timestamp"),
            method: row.get("method"),
            path: row.get("path"),
            user: row.get("user"),
            auth_type: row.get("auth_type"),
            status_code: row.get::<i32, _>("status_code") as u16,
            duration_ms: row.get("duration_ms"),
            metadata,
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
            SELECT id, timestamp, method, path, "user", auth_type, status_code, duration_ms, metadata
            FROM audit_logs
            WHERE ROW(timestamp, id) {comparison} ROW($1, $2)
            ORDER BY timestamp {order}, id {order}
            LIMIT $3
            "#
        );
        let rows = sqlx::query(&query)
            .bind(cursor.created_at)
            .bind(cursor.id)
            .bind(fetch_limit)
            .fetch_all(&self.read_pool)
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
impl AuditLogRepo for PostgresAuditLogRepo {
    async fn record(&self, entry: AuditLog) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, timestamp, method, path, "user", auth_type, status_code, duration_ms, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(entry.timestamp)
        .bind(&entry.method)
        .bind(&entry.path)
        .bind(&entry.user)
        .bind(&entry.auth_type)
        .bind(entry.status_code as i32)
        .bind(entry.duration_ms)
        .bind(&entry.metadata)
        .execute(&self.write_pool)
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
            SELECT id, timestamp, method, path, "user", auth_type, status_code, duration_ms, metadata
            FROM audit_logs ORDER BY timestamp {order}, id {order} LIMIT $1
            "#
        );
        let rows = sqlx::query(&query)
            .bind(limit + 1)
            .fetch_all(&self.read_pool)
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
