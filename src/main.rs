//! Binary entrypoint: parse CLI arguments, load configuration, initialize
//! tracing, build [`AppState`], and serve.

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;
use fanout_proxy::{AppState, StartupError, build_app, config::GatewayConfig};

/// An authenticating, auditing reverse proxy for OpenAI-compatible LLM APIs.
#[derive(Debug, Parser)]
#[command(name = "fanout-proxy", version, about)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Override the configured listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Run pending database migrations and exit without serving traffic.
    #[arg(long)]
    migrate_only: bool,
}

/// Top-level failure modes for the binary; everything else is wrapped in
/// one of the library's own error types.
#[derive(Debug, thiserror::Error)]
enum MainError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] fanout_proxy::config::ConfigError),

    #[error(transparent)]
    Startup(#[from] StartupError),

    #[error(transparent)]
    Db(#[from] fanout_proxy::db::DbError),

    #[error("invalid listen address: {0}")]
    Addr(#[from] std::net::AddrParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), MainError> {
    let cli = Cli::parse();

    let mut config = GatewayConfig::from_file(&cli.config)?;

    if let Some(port) = cli.port {
        config.server.port = port;
    }

    fanout_proxy::observability::init_tracing(&config.logging);

    if cli.migrate_only {
        // `DbPool::connect` itself runs migrations when the database config
        // requests it; constructing the pool is enough to apply them.
        let _ = fanout_proxy::db::DbPool::connect(&config.database).await?;
        tracing::info!("migrations applied, exiting");
        return Ok(());
    }

    let host = config.server.host.clone();
    let port = config.server.port;

    let state = AppState::new(config).await?;
    let app = build_app(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    tracing::info!(%addr, "starting fanout-proxy");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
