mod api_keys;
mod audit_logs;
mod groups;
mod models;
mod token_usage;
mod users;

pub use api_keys::PostgresApiKeyRepo;
pub use audit_logs::PostgresAuditLogRepo;
pub use groups::PostgresGroupRepo;
pub use models::PostgresModelRepo;
pub use token_usage::PostgresTokenUsageRepo;
pub use users::PostgresUserRepo;
