//! Model catalog and group-based access control.

pub mod registry;
pub mod types;

pub use registry::AdapterRegistry;
pub use types::{ModelWithGroups, RefreshReport, RefreshSummary};

use crate::{
    config::ProvidersConfig,
    db::DbPool,
    error::{ApiError, ApiResult},
    models::{CreateModel, Group, Model, ModelStatus, Provider, UpdateModel},
};

/// Access resolution: the admin group sees every approved model,
/// everyone else sees the union of their groups' approved models.
pub async fn models_for_principal(db: &DbPool, groups: &[String]) -> ApiResult<Vec<Model>> {
    if groups.iter().any(|g| g == "admin") {
        return Ok(db.models().list_by_status(ModelStatus::Approved).await?);
    }
    Ok(db.models().list_approved_for_groups(groups).await?)
}

pub async fn get_all_models(db: &DbPool) -> ApiResult<Vec<Model>> {
    Ok(db.models().list().await?)
}

pub async fn get_model(db: &DbPool, id: i64) -> ApiResult<Model> {
    db.models()
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("model {id} not found")))
}

pub async fn get_by_technical_name(db: &DbPool, technical_name: &str) -> ApiResult<Model> {
    db.models()
        .get_by_technical_name(technical_name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("model '{technical_name}' not found")))
}

/// Resolve the model a chat/completion request names: first by
/// `technical_name` (the normal case), falling back to an exact
/// `display_name` match so operator-facing aliases keep working.
pub async fn resolve_requested_model(db: &DbPool, identifier: &str) -> ApiResult<Model> {
    if let Some(model) = db.models().get_by_technical_name(identifier).await? {
        return Ok(model);
    }
    db.models()
        .list()
        .await?
        .into_iter()
        .find(|m| m.display_name == identifier)
        .ok_or_else(|| ApiError::NotFound(format!("model '{identifier}' not found")))
}

/// Create a model. Duplicate `technical_name` is a conflict, never a silent
/// upsert — only [`refresh_models`] upserts.
pub async fn create_model(db: &DbPool, input: CreateModel) -> ApiResult<Model> {
    if let Err(msg) = input.validate_azure_invariant() {
        return Err(ApiError::Validation(msg));
    }
    if db
        .models()
        .get_by_technical_name(&input.technical_name)
        .await?
        .is_some()
    {
        return Err(ApiError::AlreadyExists(format!(
            "model '{}' already exists",
            input.technical_name
        )));
    }
    Ok(db.models().create(input).await?)
}

pub async fn update_model(db: &DbPool, id: i64, input: UpdateModel) -> ApiResult<Model> {
    get_model(db, id).await?;
    Ok(db.models().update(id, input).await?)
}

pub async fn set_model_status(db: &DbPool, id: i64, status: ModelStatus) -> ApiResult<Model> {
    get_model(db, id).await?;
    Ok(db.models().set_status(id, status).await?)
}

/// Deleting a model retires it (the row, and its historical `TokenUsage`
/// rows, are never hard-deleted) and drops every group-authorization edge
/// pointing at it. The schema's `ON DELETE CASCADE` on `model_authorization`
/// only fires on an actual row delete, which this never performs, so the
/// edges are revoked explicitly here.
pub async fn delete_model(db: &DbPool, id: i64) -> ApiResult<()> {
    get_model(db, id).await?;
    for group_id in db.models().list_authorized_groups(id).await? {
        db.models().revoke_group(id, group_id).await?;
    }
    db.models().set_status(id, ModelStatus::Retired).await?;
    Ok(())
}

/// Idempotent: re-authorizing an already-authorized group is a no-op that
/// returns the current model.
pub async fn add_model_to_group(db: &DbPool, model_id: i64, group_id: i64) -> ApiResult<Model> {
    get_model(db, model_id).await?;
    get_group(db, group_id).await?;
    db.models().authorize_group(model_id, group_id).await?;
    get_model(db, model_id).await
}

/// Removing a non-existent edge is `EntityNotFound`, never a silent no-op.
pub async fn remove_model_from_group(db: &DbPool, model_id: i64, group_id: i64) -> ApiResult<()> {
    let authorized = db.models().list_authorized_groups(model_id).await?;
    if !authorized.contains(&group_id) {
        return Err(ApiError::NotFound(format!(
            "model {model_id} is not authorized for group {group_id}"
        )));
    }
    db.models().revoke_group(model_id, group_id).await?;
    Ok(())
}

pub async fn get_groups_for_model(db: &DbPool, model_id: i64) -> ApiResult<Vec<Group>> {
    get_model(db, model_id).await?;
    let group_ids = db.models().list_authorized_groups(model_id).await?;
    let mut groups = Vec::with_capacity(group_ids.len());
    for id in group_ids {
        if let Some(group) = db.groups().get_by_id(id).await? {
            groups.push(group);
        }
    }
    Ok(groups)
}

async fn get_group(db: &DbPool, id: i64) -> ApiResult<Group> {
    db.groups()
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("group {id} not found")))
}

/// Catalog refresh: query every configured provider's `list_models`
/// and upsert by `technical_name = "<provider_name>_<remote_id>"`. Existing
/// rows keep their operator-chosen status; only `url`/`capabilities` refresh.
pub async fn refresh_models(
    db: &DbPool,
    providers: &ProvidersConfig,
    adapters: &AdapterRegistry,
) -> ApiResult<RefreshReport> {
    let mut report = RefreshReport::default();

    for config in &providers.configs {
        let provider_name = config.name().to_string();
        let mut summary = RefreshSummary {
            provider: provider_name.clone(),
            ..Default::default()
        };

        let adapter = match crate::providers::build_adapter(config) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(provider = %provider_name, error = %e, "skipping provider during catalog refresh");
                report.providers.push(summary);
                continue;
            }
        };

        let listed = match adapter.list_models().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(provider = %provider_name, error = %e, "list_models failed during catalog refresh");
                report.providers.push(summary);
                continue;
            }
        };

        summary.discovered = listed.data.len();

        for entry in listed.data {
            let technical_name = format!("{provider_name}_{}", entry.id);
            match db.models().get_by_technical_name(&technical_name).await? {
                Some(existing) => {
                    db.models()
                        .update(
                            existing.id,
                            UpdateModel {
                                url: Some(provider_url(config)),
                                display_name: None,
                                api_version: None,
                                capabilities: None,
                            },
                        )
                        .await?;
                    summary.updated += 1;
                }
                None => {
                    db.models()
                        .create(CreateModel {
                            url: provider_url(config),
                            display_name: entry.id.clone(),
                            technical_name,
                            provider: provider_kind(config),
                            api_version: provider_api_version(config),
                            capabilities: serde_json::Value::Null,
                        })
                        .await?;
                    summary.created += 1;
                }
            }
        }

        report.providers.push(summary);
    }

    adapters.clear();
    Ok(report)
}

fn provider_url(config: &crate::config::ProviderConfig) -> String {
    use crate::config::ProviderConfig;
    match config {
        ProviderConfig::OpenAi(c) => c.base_url.clone(),
        ProviderConfig::AzureOpenai(c) => c.base_url.clone(),
        ProviderConfig::Unique(c) => c.base_url.clone(),
    }
}

fn provider_kind(config: &crate::config::ProviderConfig) -> Provider {
    use crate::config::ProviderConfig;
    match config {
        ProviderConfig::OpenAi(_) => Provider::Openai,
        ProviderConfig::AzureOpenai(_) => Provider::Azure,
        ProviderConfig::Unique(_) => Provider::Unique,
    }
}

fn provider_api_version(config: &crate::config::ProviderConfig) -> Option<String> {
    use crate::config::ProviderConfig;
    match config {
        ProviderConfig::AzureOpenai(c) => Some(c.api_version.clone()),
        _ => None,
    }
}
