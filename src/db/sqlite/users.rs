use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{
        error::DbResult,
        repos::{Cursor, ListParams, ListResult, PageCursors, UserRepo, cursor_from_row},
    },
    models::{CreateUser, UpdateUser, User},
};

pub struct SqliteUserRepo {
    pool: SqlitePool,
}

impl SqliteUserRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_row(row: &sqlx::sqlite::SqliteRow) -> DbResult<User> {
        let groups_json: String = row.get("groups");
        Ok(User {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            username: row.get("username"),
            email: row.get("email"),
            is_active: row.get("is_active"),
            groups: serde_json::from_str(&groups_json).unwrap_or_default(),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    async fn list_with_cursor(
        &self,
        params: &ListParams,
        cursor: &Cursor,
        fetch_limit: i64,
        limit: i64,
    ) -> DbResult<ListResult<User>> {
        let (comparison, order, should_reverse) =
            params.sort_order.cursor_query_params(params.direction);

        let query = format!(
            r#"
            SELECT id, username, email, is_active, groups, created_at, updated_at
            FROM users
            WHERE (created_at, id) {comparison} (?, ?)
            ORDER BY created_at {order}, id {order}
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
            PageCursors::from_items(&items, has_more, params.direction, Some(cursor), |u| {
                cursor_from_row(u.created_at, u.id)
            });

        Ok(ListResult::new(items, has_more, cursors))
    }
}

#[async_trait]
impl UserRepo for SqliteUserRepo {
    async fn create(&self, input: CreateUser) -> DbResult<User> {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let groups_json = serde_json::to_string(&input.groups)?;

        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, is_active, groups, created_at, updated_at)
            VALUES (?, ?, ?, TRUE, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&input.username)
        .bind(&input.email)
        .bind(&groups_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(User {
            id,
            username: input.username,
            email: input.email,
            is_active: true,
            groups: input.groups,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, email, is_active, groups, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn get_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, email, is_active, groups, created_at, updated_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn list(&self, params: ListParams) -> DbResult<ListResult<User>> {
        let limit = params.limit.unwrap_or(50).clamp(1, 500);

        if let Some(cursor) = &params.cursor {
            return self.list_with_cursor(&params, cursor, limit + 1, limit).await;
        }

        let order = params.sort_order.as_sql();
        let query = format!(
            "SELECT id, username, email, is_active, groups, created_at, updated_at FROM users ORDER BY created_at {order}, id {order} LIMIT ?"
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

        let cursors = PageCursors::from_items(&items, has_more, params.direction, None, |u| {
            cursor_from_row(u.created_at, u.id)
        });

        Ok(ListResult::new(items, has_more, cursors))
    }

    async fn count(&self) -> DbResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    async fn update(&self, id: Uuid, input: UpdateUser) -> DbResult<User> {
        let existing = self
            .get_by_id(id)
            .await?
            .ok_or(crate::db::error::DbError::NotFound)?;

        let email = input.email.or(existing.email);
        let groups = input.groups.unwrap_or(existing.groups);
        let is_active = input.is_active.unwrap_or(existing.is_active);
        let groups_json = serde_json::to_string(&groups)?;
        let now = Utc::now();

        sqlx::query(
            "UPDATE users SET email = ?, groups = ?, is_active = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&email)
        .bind(&groups_json)
        .bind(is_active)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(User {
            id,
            username: existing.username,
            email,
            is_active,
            groups,
            created_at: existing.created_at,
            updated_at: now,
        })
    }

    async fn deactivate(&self, id: Uuid) -> DbResult<()> {
        sqlx::query("UPDATE users SET is_active = FALSE, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_or_create_by_username(&self, username: &str, groups: &[String]) -> DbResult<User> {
        if let Some(user) = self.get_by_username(username).await? {
            return Ok(user);
        }
        self.create(CreateUser {
            username: username.to_string(),
            email: None,
            groups: groups.to_vec(),
        })
        .await
    }
}
