use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// The upstream family a [`Model`] is routed through.
///
/// A tagged-variant discriminator rather than a subclass hierarchy — the
/// database stores it as the single-table discriminator column
/// `model_type`/`provider`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Openai,
    Azure,
    Anthropic,
    Mistral,
    Cohere,
    Unique,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Openai => "openai",
            Provider::Azure => "azure",
            Provider::Anthropic => "anthropic",
            Provider::Mistral => "mistral",
            Provider::Cohere => "cohere",
            Provider::Unique => "unique",
        }
    }

    /// Azure is the only family that requires an `api_version` on the Model row.
    pub fn requires_api_version(&self) -> bool {
        matches!(self, Provider::Azure)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(Provider::Openai),
            "azure" => Ok(Provider::Azure),
            "anthropic" => Ok(Provider::Anthropic),
            "mistral" => Ok(Provider::Mistral),
            "cohere" => Ok(Provider::Cohere),
            "unique" => Ok(Provider::Unique),
            other => Err(format!("unknown provider '{other}'")),
        }
    }
}

/// Lifecycle status of a [`Model`] row.
///
/// Models enter as `New` (admin POST or catalog refresh discovery). An
/// operator promotes to `Approved`; only then may traffic route. `Deprecated`
/// and `Retired` are one-way policy states reached from `Approved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelStatus {
    New,
    Pending,
    Approved,
    Disabled,
    Rejected,
    Deprecated,
    Retired,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::New => "NEW",
            ModelStatus::Pending => "PENDING",
            ModelStatus::Approved => "APPROVED",
            ModelStatus::Disabled => "DISABLED",
            ModelStatus::Rejected => "REJECTED",
            ModelStatus::Deprecated => "DEPRECATED",
            ModelStatus::Retired => "RETIRED",
        }
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModelStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(ModelStatus::New),
            "PENDING" => Ok(ModelStatus::Pending),
            "APPROVED" => Ok(ModelStatus::Approved),
            "DISABLED" => Ok(ModelStatus::Disabled),
            "REJECTED" => Ok(ModelStatus::Rejected),
            "DEPRECATED" => Ok(ModelStatus::Deprecated),
            "RETIRED" => Ok(ModelStatus::Retired),
            other => Err(format!("unknown model status '{other}'")),
        }
    }
}

/// A model registered in the catalog. `technical_name` is the unique key
/// external callers address (`model` field on chat/completion requests).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: i64,
    pub url: String,
    pub display_name: String,
    pub technical_name: String,
    pub provider: Provider,
    pub status: ModelStatus,
    /// Required and non-empty iff `provider == Provider::Azure`.
    pub api_version: Option<String>,
    pub capabilities: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Invariant: Azure models carry a non-empty
    /// `api_version`, and only Azure models do.
    pub fn check_api_version_invariant(&self) -> Result<(), String> {
        match (self.provider.requires_api_version(), &self.api_version) {
            (true, Some(v)) if !v.trim().is_empty() => Ok(()),
            (true, _) => Err(format!(
                "model '{}' has provider=azure but no api_version",
                self.technical_name
            )),
            (false, Some(_)) => Err(format!(
                "model '{}' has provider={} but carries an api_version",
                self.technical_name, self.provider
            )),
            (false, None) => Ok(()),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == ModelStatus::Approved
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateModel {
    #[validate(url)]
    pub url: String,
    #[validate(length(min = 1, max = 255))]
    pub display_name: String,
    #[validate(length(min = 1, max = 255))]
    pub technical_name: String,
    pub provider: Provider,
    pub api_version: Option<String>,
    #[serde(default)]
    pub capabilities: Value,
}

impl CreateModel {
    pub fn validate_azure_invariant(&self) -> Result<(), String> {
        match (
            self.provider.requires_api_version(),
            self.api_version.as_deref(),
        ) {
            (true, Some(v)) if !v.trim().is_empty() => Ok(()),
            (true, _) => Err("azure models require a non-empty api_version".to_string()),
            (false, Some(_)) => Err(format!(
                "only azure models may carry an api_version (got provider={})",
                self.provider
            )),
            (false, None) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateModel {
    #[validate(url)]
    pub url: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub display_name: Option<String>,
    pub api_version: Option<String>,
    pub capabilities: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn azure_requires_api_version() {
        assert!(Provider::Azure.requires_api_version());
        assert!(!Provider::Openai.requires_api_version());
        assert!(!Provider::Unique.requires_api_version());
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            ModelStatus::New,
            ModelStatus::Pending,
            ModelStatus::Approved,
            ModelStatus::Disabled,
            ModelStatus::Rejected,
            ModelStatus::Deprecated,
            ModelStatus::Retired,
        ] {
            assert_eq!(s.as_str().parse::<ModelStatus>().unwrap(), s);
        }
    }

    #[test]
    fn api_version_invariant_rejects_azure_without_version() {
        let model = Model {
            id: 1,
            url: "https://example.openai.azure.com".into(),
            display_name: "GPT-4".into(),
            technical_name: "azure_gpt-4".into(),
            provider: Provider::Azure,
            status: ModelStatus::Approved,
            api_version: None,
            capabilities: Value::Null,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(model.check_api_version_invariant().is_err());
    }

    #[test]
    fn api_version_invariant_rejects_non_azure_with_version() {
        let model = Model {
            id: 1,
            url: "https://api.openai.com".into(),
            display_name: "GPT-4".into(),
            technical_name: "openai_gpt-4".into(),
            provider: Provider::Openai,
            status: ModelStatus::Approved,
            api_version: Some("2024-06-01".into()),
            capabilities: Value::Null,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(model.check_api_version_invariant().is_err());
    }
}
