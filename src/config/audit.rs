use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::providers::TlsModeConfig;
use crate::providers::retry::RetryPolicy;

fn default_true() -> bool {
    true
}

fn default_sensitive_headers() -> Vec<String> {
    vec![
        "authorization".into(),
        "x-api-key".into(),
        "cookie".into(),
        "x-app-id".into(),
        "x-company-id".into(),
    ]
}

fn default_exclude_paths() -> Vec<String> {
    vec!["/v1/health".into(), "/v1/health/ready".into()]
}

/// Configuration for the request/response audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Persist every record to the `audit_logs` table.
    #[serde(default = "default_true")]
    pub db_enabled: bool,

    #[serde(default)]
    pub exclude_paths: Option<Vec<String>>,

    /// Request/response header names redacted before a record is emitted
    /// anywhere (database, print forwarder, HTTP forwarders).
    #[serde(default)]
    pub sensitive_headers: Option<Vec<String>>,

    #[serde(default)]
    pub forwarders: AuditForwardersConfig,
}

impl AuditConfig {
    pub fn exclude_paths(&self) -> Vec<String> {
        self.exclude_paths.clone().unwrap_or_else(default_exclude_paths)
    }

    pub fn sensitive_headers(&self) -> Vec<String> {
        self.sensitive_headers
            .clone()
            .unwrap_or_else(default_sensitive_headers)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AuditForwardersConfig {
    #[serde(default)]
    pub print: Option<PrintForwarderConfig>,
    #[serde(default)]
    pub http: Vec<HttpForwarderConfig>,
}

/// Emits one `tracing` event per audit record, at a configurable level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrintForwarderConfig {
    #[serde(default)]
    pub level: AuditLogLevel,
}

impl Default for PrintForwarderConfig {
    fn default() -> Self {
        Self {
            level: AuditLogLevel::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLogLevel {
    Debug,
    #[default]
    Info,
    Warn,
}

/// POSTs every audit record as JSON to `url`, bounded by its own retry
/// budget. Delivery failures are logged and never propagate to the request
/// that generated the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpForwarderConfig {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_forwarder_retry_count")]
    pub retry_count: u32,
    #[serde(default)]
    pub tls: TlsModeConfig,
}

fn default_forwarder_retry_count() -> u32 {
    3
}

impl HttpForwarderConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_count,
            ..RetryPolicy::exponential(std::time::Duration::from_millis(250), std::time::Duration::from_secs(5))
        }
    }
}
