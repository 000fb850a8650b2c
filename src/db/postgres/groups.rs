use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};

use crate::{
    db::{error::DbResult, repos::GroupRepo},
    models::{CreateGroup, Group, UpdateGroup},
};

pub struct PostgresGroupRepo {
    pool: PgPool,
}

impl PostgresGroupRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn parse_row(row: &sqlx::postgres::PgRow) -> Group {
        Group {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl GroupRepo for PostgresGroupRepo {
    async fn create(&self, input: CreateGroup) -> DbResult<Group> {
        let now = Utc::now();
        let row = sqlx::query(
            "INSERT INTO groups (name, description, created_at, updated_at) VALUES ($1, $2, $3, $3) RETURNING id",
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(Group {
            id: row.get("id"),
            name: input.name,
            description: input.description,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> DbResult<Option<Group>> {
        let row = sqlx::query(
            "SELECT id, name, description, created_at, updated_at FROM groups WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(Self::parse_row))
    }

    async fn get_by_name(&self, name: &str) -> DbResult<Option<Group>> {
        let row = sqlx::query(
            "SELECT id, name, description, created_at, updated_at FROM groups WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(Self::parse_row))
    }

    async fn list(&self) -> DbResult<Vec<Group>> {
        let rows = sqlx::query(
            "SELECT id, name, description, created_at, updated_at FROM groups ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(Self::parse_row).collect())
    }

    async fn update(&self, id: i64, input: UpdateGroup) -> DbResult<Group> {
        let existing = self
            .get_by_id(id)
            .await?
            .ok_or(crate::db::error::DbError::NotFound)?;
        let description = input.description.or(existing.description);
        let now = Utc::now();

        sqlx::query("UPDATE groups SET description = $1, updated_at = $2 WHERE id = $3")
            .bind(&description)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(Group {
            id,
            name: existing.name,
            description,
            created_at: existing.created_at,
            updated_at: now,
        })
    }

    async fn delete(&self, id: i64) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(crate::db::error::DbError::NotFound);
        }
        Ok(())
    }
}
