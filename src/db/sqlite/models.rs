use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::ModelRepo,
    },
    models::{CreateModel, Model, ModelStatus, Provider, UpdateModel},
};

pub struct SqliteModelRepo {
    pool: SqlitePool,
}

impl SqliteModelRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_row(row: &sqlx::sqlite::SqliteRow) -> DbResult<Model> {
        let provider: String = row.get("provider");
        let status: String = row.get("status");
        let capabilities: String = row.get("capabilities");
        Ok(Model {
            id: row.get("id"),
            url: row.get("url"),
            display_name: row.get("display_name"),
            technical_name: row.get("technical_name"),
            provider: provider
                .parse::<Provider>()
                .map_err(DbError::Internal)?,
            status: status.parse::<ModelStatus>().map_err(DbError::Internal)?,
            api_version: row.get("api_version"),
            capabilities: serde_json::from_str(&capabilities)?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    const COLUMNS: &'static str =
        "id, url, display_name, technical_name, provider, status, api_version, capabilities, created_at, updated_at";
}

#[async_trait]
impl ModelRepo for SqliteModelRepo {
    async fn create(&self, input: CreateModel) -> DbResult<Model> {
        input
            .validate_azure_invariant()
            .map_err(DbError::Validation)?;

        if self.get_by_technical_name(&input.technical_name).await?.is_some() {
            return Err(DbError::Conflict(format!(
                "model with technical_name '{}' already exists",
                input.technical_name
            )));
        }

        let now = Utc::now();
        let capabilities_json = serde_json::to_string(&input.capabilities)?;
        let id = sqlx::query(
            r#"
            INSERT INTO models (url, display_name, technical_name, provider, status, api_version, capabilities, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&input.url)
        .bind(&input.display_name)
        .bind(&input.technical_name)
        .bind(input.provider.as_str())
        .bind(ModelStatus::New.as_str())
        .bind(&input.api_version)
        .bind(&capabilities_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Model {
            id,
            url: input.url,
            display_name: input.display_name,
            technical_name: input.technical_name,
            provider: input.provider,
            status: ModelStatus::New,
            api_version: input.api_version,
            capabilities: input.capabilities,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> DbResult<Option<Model>> {
        let row = sqlx::query(&format!("SELECT {} FROM models WHERE id = ?", Self::COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn get_by_technical_name(&self, technical_name: &str) -> DbResult<Option<Model>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM models WHERE technical_name = ?",
            Self::COLUMNS
        ))
        .bind(technical_name)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn list(&self) -> DbResult<Vec<Model>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM models ORDER BY technical_name ASC",
            Self::COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::parse_row).collect()
    }

    async fn list_by_status(&self, status: ModelStatus) -> DbResult<Vec<Model>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM models WHERE status = ? ORDER BY technical_name ASC",
            Self::COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::parse_row).collect()
    }

    async fn update(&self, id: i64, input: UpdateModel) -> DbResult<Model> {
        let existing = self.get_by_id(id).await?.ok_or(DbError::NotFound)?;
        let url = input.url.unwrap_or(existing.url);
        let display_name = input.display_name.unwrap_or(existing.display_name);
        let api_version = input.api_version.or(existing.api_version);
        let capabilities = input.capabilities.unwrap_or(existing.capabilities);
        let now = Utc::now();
        let capabilities_json = serde_json::to_string(&capabilities)?;

        sqlx::query(
            "UPDATE models SET url = ?, display_name = ?, api_version = ?, capabilities = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&url)
        .bind(&display_name)
        .bind(&api_version)
        .bind(&capabilities_json)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(Model {
            id,
            url,
            display_name,
            technical_name: existing.technical_name,
            provider: existing.provider,
            status: existing.status,
            api_version,
            capabilities,
            created_at: existing.created_at,
            updated_at: now,
        })
    }

    async fn set_status(&self, id: i64, status: ModelStatus) -> DbResult<Model> {
        let existing = self.get_by_id(id).await?.ok_or(DbError::NotFound)?;
        let now = Utc::now();
        sqlx::query("UPDATE models SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(Model {
            status,
            updated_at: now,
            ..existing
        })
    }

    async fn list_approved_for_groups(&self, group_names: &[String]) -> DbResult<Vec<Model>> {
        if group_names.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = group_names.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let query = format!(
            r#"
            SELECT DISTINCT {cols} FROM models m
            JOIN model_authorization ma ON ma.model_id = m.id
            JOIN groups g ON g.id = ma.group_id
            WHERE g.name IN ({placeholders}) AND m.status = ?
            ORDER BY m.technical_name ASC
            "#,
            cols = Self::COLUMNS
                .split(", ")
                .map(|c| format!("m.{c}"))
                .collect::<Vec<_>>()
                .join(", "),
        );
        let mut q = sqlx::query(&query);
        for name in group_names {
            q = q.bind(name);
        }
        q = q.bind(ModelStatus::Approved.as_str());
        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(Self::parse_row).collect()
    }

    async fn authorize_group(&self, model_id: i64, group_id: i64) -> DbResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO model_authorization (model_id, group_id) VALUES (?, ?)",
        )
        .bind(model_id)
        .bind(group_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_group(&self, model_id: i64, group_id: i64) -> DbResult<()> {
        let result = sqlx::query(
            "DELETE FROM model_authorization WHERE model_id = ? AND group_id = ?",
        )
        .bind(model_id)
        .bind(group_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn list_authorized_groups(&self, model_id: i64) -> DbResult<Vec<i64>> {
        let rows = sqlx::query("SELECT group_id FROM model_authorization WHERE model_id = ?")
            .bind(model_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("group_id")).collect())
    }
}
