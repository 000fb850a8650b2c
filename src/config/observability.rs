use serde::{Deserialize, Serialize};

fn default_log_level() -> String {
    "info".to_string()
}

/// Logging configuration, consumed by [`crate::observability::tracing_init`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Passed straight through to `tracing_subscriber::EnvFilter` unless
    /// `RUST_LOG` is set, in which case the environment wins.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, colorized when stdout is a terminal.
    #[default]
    Pretty,
    /// One JSON object per line, for log aggregators.
    Json,
}
