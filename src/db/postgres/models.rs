use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::ModelRepo,
    },
    models::{CreateModel, Model, ModelStatus, Provider, UpdateModel},
};

pub struct PostgresModelRepo {
    pool: PgPool,
}

impl PostgresModelRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn parse_row(row: &sqlx::postgres::PgRow) -> DbResult<Model> {
        let provider: String = row.get("provider");
        let status: String = row.get("status");
        let capabilities: serde_json::Value = row.get("capabilities");
        Ok(Model {
            id: row.get("id"),
            url: row.get("url"),
            display_name: row.get("display_name"),
            technical_name: row.get("technical_name"),
            provider: provider.parse::<Provider>().map_err(DbError::Internal)?,
            status: status.parse::<ModelStatus>().map_err(DbError::Internal)?,
            api_version: row.get("api_version"),
            capabilities,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    const COLUMNS: &'static str =
        "id, url, display_name, technical_name, provider, status, api_version, capabilities, created_at, updated_at";
}

#[async_trait]
impl ModelRepo for PostgresModelRepo {
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
        let row = sqlx::query(
            r#"
            INSERT INTO models (url, display_name, technical_name, provider, status, api_version, capabilities, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING id
            "#,
        )
        .bind(&input.url)
        .bind(&input.display_name)
        .bind(&input.technical_name)
        .bind(input.provider.as_str())
        .bind(ModelStatus::New.as_str())
        .bind(&input.api_version)
        .bind(&input.capabilities)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(Model {
            id: row.get("id"),
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
        let row = sqlx::query(&format!("SELECT {} FROM models WHERE id = $1", Self::COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn get_by_technical_name(&self, technical_name: &str) -> DbResult<Option<Model>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM models WHERE technical_name = $1",
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
            "SELECT {} FROM models WHERE status = $1 ORDER BY technical_name ASC",
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

        sqlx::query(
            "UPDATE models SET url = $1, display_name = $2, api_version = $3, capabilities = $4, updated_at = $5 WHERE id = $6",
        )
        .bind(&url)
        .bind(&display_name)
        .bind(&api_version)
        .bind(&capabilities)
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
        sqlx::query("UPDATE models SET status = $1, updated_at = $2 WHERE id = $3")
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
        let row_query = format!(
            r#"
            SELECT DISTINCT {cols} FROM models m
            JOIN model_authorization ma ON ma.model_id = m.id
            JOIN groups g ON g.id = ma.group_id
            WHERE g.name = ANY($1) AND m.status = $2
            ORDER BY m.technical_name ASC
            "#,
            cols = Self::COLUMNS
                .split(", ")
                .map(|c| format!("m.{c}"))
                .collect::<Vec<_>>()
                .join(", "),
        );
        let rows = sqlx::query(&row_query)
            .bind(group_names)
            .bind(ModelStatus::Approved.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::parse_row).collect()
    }

    async fn authorize_group(&self, model_id: i64, group_id: i64) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO model_authorization (model_id, group_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(model_id)
        .bind(group_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_group(&self, model_id: i64, group_id: i64) -> DbResult<()> {
        let result = sqlx::query(
            "DELETE FROM model_authorization WHERE model_id = $1 AND group_id = $2",
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
        let rows = sqlx::query("SELECT group_id FROM model_authorization WHERE model_id = $1")
            .bind(model_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("group_id")).collect())
    }
}
