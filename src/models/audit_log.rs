use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One HTTP request/response pair, recorded by the audit middleware.
/// Append-only: there is no update or delete operation, by design — rows
/// are immutable evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub user: Option<String>,
    pub auth_type: Option<String>,
    pub status_code: u16,
    pub duration_ms: i64,
    pub metadata: Option<Value>,
}
