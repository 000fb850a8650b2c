//! Per-model provider adapter cache.
//!
//! Adapters are cheap to reuse (they hold only an immutable config and a
//! pooled HTTP client) but construction reads configuration and may fail
//! (missing API key), so they're built lazily and cached by `(url,
//! technical_name)` rather than eagerly at startup for every model.

use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    config::ProvidersConfig,
    error::ApiError,
    models::Model,
    providers::{ProviderAdapter, build_adapter},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AdapterKey {
    url: String,
    technical_name: String,
}

/// Process-wide cache of constructed [`ProviderAdapter`]s.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: DashMap<AdapterKey, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve (building and caching if needed) the adapter for `model`.
    ///
    /// The provider configuration used to construct the adapter is the one
    /// whose `name` is the prefix of `model.technical_name` before its first
    /// `_` — the same provider name `catalog::refresh_models` used to build
    /// that `technical_name` in the first place.
    pub fn get_or_build(
        &self,
        model: &Model,
        providers: &ProvidersConfig,
    ) -> Result<Arc<dyn ProviderAdapter>, ApiError> {
        let key = AdapterKey {
            url: model.url.clone(),
            technical_name: model.technical_name.clone(),
        };

        if let Some(adapter) = self.adapters.get(&key) {
            return Ok(adapter.clone());
        }

        let provider_name = model
            .technical_name
            .split_once('_')
            .map(|(prefix, _)| prefix)
            .unwrap_or(model.technical_name.as_str());

        let config = providers.get(provider_name).ok_or_else(|| {
            ApiError::Configuration(format!(
                "no provider configuration named '{provider_name}' for model '{}'",
                model.technical_name
            ))
        })?;

        let adapter: Arc<dyn ProviderAdapter> = Arc::from(
            build_adapter(config)
                .map_err(|e| ApiError::Configuration(format!("failed to build adapter: {e}")))?,
        );

        self.adapters.insert(key, adapter.clone());
        Ok(adapter)
    }

    /// Drop every cached adapter, forcing rebuilds from current
    /// configuration. Used after a provider configuration reload.
    pub fn clear(&self) {
        self.adapters.clear();
    }
}
