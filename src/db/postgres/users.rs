use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{Cursor, ListParams, ListResult, PageCursors, UserRepo, cursor_from_row},
    },
    models::{CreateUser, UpdateUser, User},
};

pub struct PostgresUserRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresUserRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn parse_row(row: &sqlx::postgres::PgRow) -> DbResult<User> {
        let groups_json: serde_json::Value = row.get("groups");
        Ok(User {
            id: row.get("id"),
            username: row.get("username"),
            email: row.get("email"),
            is_active: row.get("is_active"),
            groups: serde_json::from_value(groups_json).unwrap_or_default(),
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
            WHERE ROW(created_at, id) {comparison} ROW($1, $2)
            ORDER BY created_at {order}, id {order}
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
            PageCursors::from_items(&items, has_more, params.direction, Some(cursor), |u| {
                cursor_from_row(u.created_at, u.id)
            });
        Ok(ListResult::new(items, has_more, cursors))
    }
}

#[async_trait]
impl UserRepo for PostgresUserRepo {
    async fn create(&self, input: CreateUser) -> DbResult<User> {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let groups_json = serde_json::to_value(&input.groups)?;

        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, is_active, groups, created_at, updated_at)
            VALUES ($1, $2, $3, TRUE, $4, $5, $5)
            "#,
        )
        .bind(id)
        .bind(&input.username)
        .bind(&input.email)
        .bind(&groups_json)
        .bind(now)
        .execute(&self.write_pool)
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
            "SELECT id, username, email, is_active, groups, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.read_pool)
        .await?;
        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn get_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, email, is_active, groups, created_at, updated_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.read_pool)
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
            "SELECT id, username, email, is_active, groups, created_at, updated_at FROM users ORDER BY created_at {order}, id {order} LIMIT $1"
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

        let cursors = PageCursors::from_items(&items, has_more, params.direction, None, |u| {
            cursor_from_row(u.created_at, u.id)
        });
        Ok(ListResult::new(items, has_more, cursors))
    }

    async fn count(&self) -> DbResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM users")
            .fetch_one(&self.read_pool)
            .await?;
        Ok(row.get("n"))
    }

    async fn update(&self, id: Uuid, input: UpdateUser) -> DbResult<User> {
        let existing = self.get_by_id(id).await?.ok_or(DbError::NotFound)?;
        let email = input.email.or(existing.email);
        let groups = input.groups.unwrap_or(existing.groups);
        let is_active = input.is_active.unwrap_or(existing.is_active);
        let groups_json = serde_json::to_value(&groups)?;
        let now = Utc::now();

        sqlx::query(
            "UPDATE users SET email = $1, groups = $2, is_active = $3, updated_at = $4 WHERE id = $5",
        )
        .bind(&email)
        .bind(&groups_json)
        .bind(is_active)
        .bind(now)
        .bind(id)
        .execute(&self.write_pool)
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
        sqlx::query("UPDATE users SET is_active = FALSE, updated_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.write_pool)
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
