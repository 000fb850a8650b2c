mod api_keys;
mod audit_logs;
mod common;
mod groups;
mod models;
mod token_usage;
mod users;

pub use api_keys::SqliteApiKeyRepo;
pub use audit_logs::SqliteAuditLogRepo;
pub use groups::SqliteGroupRepo;
pub use models::SqliteModelRepo;
pub use token_usage::SqliteTokenUsageRepo;
pub use users::SqliteUserRepo;
