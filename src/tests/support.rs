//! Shared scaffolding for the end-to-end tests in this module: an
//! in-process router backed by a temp-file SQLite database, plus small
//! helpers for seeding users, groups, and models directly through the
//! repository layer rather than duplicating admin-route HTTP calls in every
//! test.

use std::sync::Arc;

use fanout_proxy::{
    AppState, build_app,
    auth::generate_api_key,
    config::{
        DatabaseConfig, GatewayConfig, HttpClientConfig, OpenAiProviderConfig, ProviderConfig,
        ProvidersConfig, SqliteConfig, TlsModeConfig,
    },
    models::{CreateApiKey, CreateGroup, CreateModel, CreateUser, Group, Model, ModelStatus, Provider, User},
};
use uuid::Uuid;

/// An assembled application plus the temp directory backing its database.
/// The directory is kept alive for the lifetime of the struct so the SQLite
/// file survives until the test drops it.
pub struct TestApp {
    pub app: axum::Router,
    pub state: AppState,
    _tempdir: tempfile::TempDir,
}

impl TestApp {
    /// Build an app with one `open_ai`-shaped provider named `oai` pointing
    /// at `openai_base_url` (typically a [`wiremock::MockServer`]'s URI).
    pub async fn spawn(openai_base_url: &str) -> Self {
        let tempdir = tempfile::tempdir().expect("temp dir");
        let db_path = tempdir.path().join("gateway.sqlite3");

        let config = GatewayConfig {
            database: DatabaseConfig::Sqlite(SqliteConfig {
                path: db_path.to_string_lossy().to_string(),
                create_if_missing: true,
                run_migrations: true,
                wal_mode: false,
                busy_timeout_ms: 5_000,
                max_connections: 5,
            }),
            providers: ProvidersConfig {
                configs: vec![ProviderConfig::OpenAi(OpenAiProviderConfig {
                    name: "oai".to_string(),
                    base_url: openai_base_url.to_string(),
                    api_key: "sk-upstream-test-key".to_string(),
                    http: HttpClientConfig::default(),
                    proxy_url: None,
                    tls: TlsModeConfig::default(),
                })],
            },
            ..Default::default()
        };

        let state = AppState::new(config).await.expect("failed to build app state");
        let app = build_app(state.clone());

        Self {
            app,
            state,
            _tempdir: tempdir,
        }
    }

    fn db(&self) -> &Arc<fanout_proxy::db::DbPool> {
        self.state.db.as_ref().expect("test app always configures a database")
    }

    pub async fn create_group(&self, name: &str) -> Group {
        self.db()
            .groups()
            .create(CreateGroup {
                name: name.to_string(),
                description: None,
            })
            .await
            .expect("create group")
    }

    pub async fn create_user(&self, username: &str, groups: Vec<String>) -> User {
        self.db()
            .users()
            .create(CreateUser {
                username: username.to_string(),
                email: None,
                groups,
            })
            .await
            .expect("create user")
    }

    /// Issue a fresh API key for `user_id`, returning its plaintext (`sk-...`).
    pub async fn issue_api_key(&self, user_id: Uuid) -> String {
        let (plaintext, key_hash) = generate_api_key();
        self.db()
            .api_keys()
            .create(
                user_id,
                CreateApiKey {
                    name: Some("test key".to_string()),
                    expires_at: None,
                },
                &key_hash,
            )
            .await
            .expect("create api key");
        plaintext
    }

    /// Create a model row and immediately approve it, since only `APPROVED`
    /// models are ever routable.
    pub async fn create_approved_model(&self, technical_name: &str, url: &str) -> Model {
        let model = fanout_proxy::catalog::create_model(
            self.db(),
            CreateModel {
                url: url.to_string(),
                display_name: technical_name.to_string(),
                technical_name: technical_name.to_string(),
                provider: Provider::Openai,
                api_version: None,
                capabilities: serde_json::Value::Null,
            },
        )
        .await
        .expect("create model");

        fanout_proxy::catalog::set_model_status(self.db(), model.id, ModelStatus::Approved)
            .await
            .expect("approve model")
    }

    pub async fn authorize_group(&self, model_id: i64, group_id: i64) {
        fanout_proxy::catalog::add_model_to_group(self.db(), model_id, group_id)
            .await
            .expect("authorize group for model");
    }

    /// Drain the background task tracker so spawned usage-logging tasks
    /// (streaming responses) have finished before a test asserts on the
    /// database.
    pub async fn drain_background_tasks(&self) {
        self.state.task_tracker.close();
        self.state.task_tracker.wait().await;
    }

    /// Bind the router to a real loopback socket and serve it on a
    /// background task, returning the `http://127.0.0.1:<port>` base URL.
    /// Exercising the app over a real socket (rather than an in-process
    /// `tower::Service` call) drives the full `axum::serve` body-streaming
    /// path, which matters for the streaming end-to-end tests.
    pub async fn spawn_http(&self) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback listener");
        let addr = listener.local_addr().expect("local addr");
        let app = self.app.clone();
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test app");
        });
        format!("http://{addr}")
    }
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
