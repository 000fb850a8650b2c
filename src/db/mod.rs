mod error;
#[cfg(feature = "database-postgres")]
pub mod postgres;
pub mod repos;
#[cfg(feature = "database-sqlite")]
pub mod sqlite;

use std::sync::Arc;

pub use error::{DbError, DbResult};
pub use repos::*;

use crate::config::DatabaseConfig;

/// PostgreSQL pool configuration with optional read replica.
#[cfg(feature = "database-postgres")]
pub struct PgPoolPair {
    /// Primary pool for writes.
    pub write: sqlx::PgPool,
    /// Optional read replica pool. If `None`, reads use the write pool.
    pub read: Option<sqlx::PgPool>,
}

#[cfg(feature = "database-postgres")]
impl PgPoolPair {
    pub fn read_pool(&self) -> &sqlx::PgPool {
        self.read.as_ref().unwrap_or(&self.write)
    }

    pub fn write_pool(&self) -> &sqlx::PgPool {
        &self.write
    }
}

/// Cached repository trait objects, created once at startup.
struct CachedRepos {
    users: Arc<dyn UserRepo>,
    api_keys: Arc<dyn ApiKeyRepo>,
    groups: Arc<dyn GroupRepo>,
    models: Arc<dyn ModelRepo>,
    token_usage: Arc<dyn TokenUsageRepo>,
    audit_logs: Arc<dyn AuditLogRepo>,
}

enum PoolStorage {
    #[cfg(feature = "database-sqlite")]
    Sqlite(sqlx::SqlitePool),
    #[cfg(feature = "database-postgres")]
    Postgres(PgPoolPair),
}

/// Database pool supporting both SQLite and PostgreSQL.
///
/// Repositories are cached at construction time to avoid allocation on each access.
pub struct DbPool {
    inner: PoolStorage,
    repos: CachedRepos,
}

impl DbPool {
    /// Connect according to `config`, running migrations when the backend
    /// requests it. This is the only entry point `main` uses at startup.
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        match config {
            DatabaseConfig::None => Err(DbError::NotConfigured),
            #[cfg(feature = "database-sqlite")]
            DatabaseConfig::Sqlite(c) => {
                use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
                use std::str::FromStr;

                let options = SqliteConnectOptions::from_str(&c.path)
                    .map_err(|e| DbError::Internal(e.to_string()))?
                    .create_if_missing(c.create_if_missing)
                    .busy_timeout(std::time::Duration::from_millis(c.busy_timeout_ms));
                let options = if c.wal_mode {
                    options.journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                } else {
                    options
                };

                let pool = SqlitePoolOptions::new()
                    .max_connections(c.max_connections)
                    .connect_with(options)
                    .await?;

                if c.run_migrations {
                    sqlx::migrate!("./migrations/sqlite").run(&pool).await?;
                }

                Ok(Self::from_sqlite(pool))
            }
            #[cfg(feature = "database-postgres")]
            DatabaseConfig::Postgres(c) => {
                use sqlx::postgres::PgPoolOptions;

                let write = PgPoolOptions::new()
                    .min_connections(c.min_connections)
                    .max_connections(c.max_connections)
                    .acquire_timeout(std::time::Duration::from_secs(c.connect_timeout_secs))
                    .idle_timeout(std::time::Duration::from_secs(c.idle_timeout_secs))
                    .connect(&c.url)
                    .await?;

                if c.run_migrations {
                    sqlx::migrate!("./migrations/postgres").run(&write).await?;
                }

                let read = match &c.read_url {
                    Some(url) => Some(
                        PgPoolOptions::new()
                            .max_connections(c.max_connections)
                            .connect(url)
                            .await?,
                    ),
                    None => None,
                };

                Ok(Self::from_postgres(PgPoolPair { write, read }))
            }
        }
    }

    /// Build a `DbPool` from an existing SQLite pool. Used by tests and by
    /// `connect` above.
    #[cfg(feature = "database-sqlite")]
    pub fn from_sqlite(pool: sqlx::SqlitePool) -> Self {
        let repos = CachedRepos {
            users: Arc::new(sqlite::SqliteUserRepo::new(pool.clone())),
            api_keys: Arc::new(sqlite::SqliteApiKeyRepo::new(pool.clone())),
            groups: Arc::new(sqlite::SqliteGroupRepo::new(pool.clone())),
            models: Arc::new(sqlite::SqliteModelRepo::new(pool.clone())),
            token_usage: Arc::new(sqlite::SqliteTokenUsageRepo::new(pool.clone())),
            audit_logs: Arc::new(sqlite::SqliteAuditLogRepo::new(pool.clone())),
        };
        DbPool {
            inner: PoolStorage::Sqlite(pool),
            repos,
        }
    }

    #[cfg(feature = "database-postgres")]
    pub fn from_postgres(pair: PgPoolPair) -> Self {
        let repos = CachedRepos {
            users: Arc::new(postgres::PostgresUserRepo::new(
                pair.write.clone(),
                pair.read.clone(),
            )),
            api_keys: Arc::new(postgres::PostgresApiKeyRepo::new(
                pair.write.clone(),
                pair.read.clone(),
            )),
            groups: Arc::new(postgres::PostgresGroupRepo::new(pair.write.clone())),
            models: Arc::new(postgres::PostgresModelRepo::new(pair.write.clone())),
            token_usage: Arc::new(postgres::PostgresTokenUsageRepo::new(
                pair.write.clone(),
                pair.read.clone(),
            )),
            audit_logs: Arc::new(postgres::PostgresAuditLogRepo::new(
                pair.write.clone(),
                pair.read.clone(),
            )),
        };
        DbPool {
            inner: PoolStorage::Postgres(pair),
            repos,
        }
    }

    pub fn users(&self) -> &Arc<dyn UserRepo> {
        &self.repos.users
    }

    pub fn api_keys(&self) -> &Arc<dyn ApiKeyRepo> {
        &self.repos.api_keys
    }

    pub fn groups(&self) -> &Arc<dyn GroupRepo> {
        &self.repos.groups
    }

    pub fn models(&self) -> &Arc<dyn ModelRepo> {
        &self.repos.models
    }

    pub fn token_usage(&self) -> &Arc<dyn TokenUsageRepo> {
        &self.repos.token_usage
    }

    pub fn audit_logs(&self) -> &Arc<dyn AuditLogRepo> {
        &self.repos.audit_logs
    }

    /// Backend discriminator, surfaced on the `/v1/health/detailed` probe.
    pub fn backend_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(_) => "sqlite",
            #[cfg(feature = "database-postgres")]
            PoolStorage::Postgres(_) => "postgres",
        }
    }

    /// Lightweight connectivity probe used by the readiness endpoint.
    pub async fn ping(&self) -> DbResult<()> {
        match &self.inner {
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            #[cfg(feature = "database-postgres")]
            PoolStorage::Postgres(pair) => {
                sqlx::query("SELECT 1").execute(pair.read_pool()).await?;
            }
        }
        Ok(())
    }
}
