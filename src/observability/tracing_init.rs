//! Tracing subscriber setup: structured logging in pretty or JSON form,
//! with `RUST_LOG` taking precedence over the configured level.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingConfig};

/// Installs the global tracing subscriber. Idempotent only in the sense
/// that calling it twice panics, as with any `tracing_subscriber::init`.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = build_env_filter(config);

    match config.format {
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer().pretty().with_target(true);
            tracing_subscriber::registry().with(filter).with(fmt_layer).init();
        }
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer().json().with_target(true);
            tracing_subscriber::registry().with(filter).with(fmt_layer).init();
        }
    }
}

fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(env_filter) = std::env::var("RUST_LOG") {
        return EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new(&config.level));
    }
    EnvFilter::try_new(format!(
        "{},hyper=warn,h2=warn,tower=info,sqlx=warn,reqwest=warn",
        config.level
    ))
    .unwrap_or_else(|_| EnvFilter::new(&config.level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_includes_configured_level() {
        let config = LoggingConfig::default();
        let filter = build_env_filter(&config);
        assert!(filter.to_string().contains("info"));
    }
}
