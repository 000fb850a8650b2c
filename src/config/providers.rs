use serde::{Deserialize, Serialize};

use super::{ConfigError, HttpClientConfig};
use crate::net::client::TlsMode;

/// The set of upstream provider adapters this gateway proxies to.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub configs: Vec<ProviderConfig>,
}

impl ProvidersConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for c in &self.configs {
            if !seen.insert(c.name()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate provider config name '{}'",
                    c.name()
                )));
            }
            c.validate()?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ProviderConfig> {
        self.configs.iter().find(|c| c.name() == name)
    }
}

/// One configured upstream provider account. Each entry maps to exactly one
/// [`crate::providers::ProviderAdapter`] instance constructed at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum ProviderConfig {
    OpenAi(OpenAiProviderConfig),
    AzureOpenai(AzureProviderConfig),
    Unique(UniqueProviderConfig),
}

impl ProviderConfig {
    pub fn name(&self) -> &str {
        match self {
            ProviderConfig::OpenAi(c) => &c.name,
            ProviderConfig::AzureOpenai(c) => &c.name,
            ProviderConfig::Unique(c) => &c.name,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            ProviderConfig::OpenAi(c) => {
                if c.api_key.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "provider '{}': api_key must not be empty",
                        c.name
                    )));
                }
            }
            ProviderConfig::AzureOpenai(c) => {
                if c.tenant_id.is_empty() || c.client_id.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "provider '{}': azure_openai requires tenant_id and client_id",
                        c.name
                    )));
                }
                if c.api_version.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "provider '{}': azure_openai requires api_version",
                        c.name
                    )));
                }
            }
            ProviderConfig::Unique(c) => {
                if c.app_id.is_empty() || c.company_id.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "provider '{}': unique requires app_id and company_id",
                        c.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAiProviderConfig {
    pub name: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    pub api_key: String,
    #[serde(default)]
    pub http: HttpClientConfig,
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub tls: TlsModeConfig,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AzureProviderConfig {
    pub name: String,
    /// Resource base, e.g. `https://my-resource.openai.azure.com`.
    pub base_url: String,
    pub api_version: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    /// Required for deployment listing via the management API; when absent
    /// the adapter falls back to the `/openai/models` endpoint directly.
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub resource_group: Option<String>,
    #[serde(default)]
    pub resource_name: Option<String>,
    /// Used only by the `/openai/models` fallback path.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub http: HttpClientConfig,
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub tls: TlsModeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UniqueProviderConfig {
    pub name: String,
    pub base_url: String,
    pub app_id: String,
    pub company_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub http: HttpClientConfig,
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub tls: TlsModeConfig,
}

/// JSON-serializable mirror of [`TlsMode`]; kept separate because `TlsMode`
/// carries raw certificate bytes rather than file paths once loaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TlsModeConfig {
    #[default]
    Verify,
    Disable,
    CustomCa {
        ca_path: std::path::PathBuf,
    },
    ClientCert {
        cert_path: std::path::PathBuf,
        key_path: std::path::PathBuf,
    },
}

impl TlsModeConfig {
    pub fn load(&self) -> std::io::Result<TlsMode> {
        Ok(match self {
            TlsModeConfig::Verify => TlsMode::Verify,
            TlsModeConfig::Disable => TlsMode::Disable,
            TlsModeConfig::CustomCa { ca_path } => TlsMode::CustomCa(std::fs::read(ca_path)?),
            TlsModeConfig::ClientCert { cert_path, key_path } => TlsMode::ClientCert {
                cert_pem: std::fs::read(cert_path)?,
                key_pem: std::fs::read(key_path)?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_rejected() {
        let cfg = ProvidersConfig {
            configs: vec![
                ProviderConfig::OpenAi(OpenAiProviderConfig {
                    name: "a".into(),
                    base_url: default_openai_base_url(),
                    api_key: "sk-1".into(),
                    http: HttpClientConfig::default(),
                    proxy_url: None,
                    tls: TlsModeConfig::default(),
                }),
                ProviderConfig::OpenAi(OpenAiProviderConfig {
                    name: "a".into(),
                    base_url: default_openai_base_url(),
                    api_key: "sk-2".into(),
                    http: HttpClientConfig::default(),
                    proxy_url: None,
                    tls: TlsModeConfig::default(),
                }),
            ],
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn azure_requires_api_version() {
        let cfg = AzureProviderConfig {
            name: "azure".into(),
            base_url: "https://x.openai.azure.com".into(),
            api_version: String::new(),
            tenant_id: "t".into(),
            client_id: "c".into(),
            client_secret: "s".into(),
            subscription_id: None,
            resource_group: None,
            resource_name: None,
            api_key: None,
            http: HttpClientConfig::default(),
            proxy_url: None,
            tls: TlsModeConfig::default(),
        };
        assert!(ProviderConfig::AzureOpenai(cfg).validate().is_err());
    }
}
