//! Logging configuration.

use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Logging options.
///
/// Logs go to stderr so stdout carries only results and events.
#[derive(Debug, Clone, Serialize, Deserialize, Args)]
pub struct LogConfig {
    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, env = "WEAVER_LOG_LEVEL", default_value = "info", global = true)]
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, env = "WEAVER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_owned()
}
