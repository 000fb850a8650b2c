//! DTOs for the catalog surface that don't belong on the bare domain types.

use serde::Serialize;

use crate::models::{Group, Model};

/// A model alongside the groups currently authorized to reach it, returned
/// by the admin model-detail endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ModelWithGroups {
    #[serde(flatten)]
    pub model: Model,
    pub groups: Vec<Group>,
}

/// Summary of one `POST /v1/admin/models/refresh` run against a single
/// configured provider.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshSummary {
    pub provider: String,
    pub discovered: usize,
    pub created: usize,
    pub updated: usize,
}

/// Aggregate result of refreshing every configured provider.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    pub providers: Vec<RefreshSummary>,
}

impl RefreshReport {
    pub fn total_discovered(&self) -> usize {
        self.providers.iter().map(|p| p.discovered).sum()
    }
}
