//! CLI configuration management.
//!
//! ```text
//! Cli
//! ├── log: LogConfig          # Log level filter and output format
//! └── command: Command
//!     ├── run                 # Execute a workflow file
//!     ├── inspect             # Print order, layers and hash
//!     └── status              # Print a stored execution
//! ```
//!
//! All options can be provided via CLI arguments or environment variables.
//!
//! # Example
//!
//! ```bash
//! weaver run flow.json --input '{"topic": "rust"}' --parallel --strategy continue
//!
//! # Or via environment variables
//! WEAVER_STATE_DIR=/var/lib/weaver weaver run flow.json
//! ```

mod commands;
mod logging;

use clap::{Parser, Subcommand};
pub use commands::{InspectArgs, RunArgs, StatusArgs};
pub use logging::{LogConfig, LogFormat};

use crate::TRACING_TARGET_STARTUP;

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "weaver")]
#[command(about = "Run and inspect workflow graphs")]
#[command(version)]
pub struct Cli {
    /// Logging configuration.
    #[clap(flatten)]
    pub log: LogConfig,

    /// Command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Executes a workflow definition file.
    Run(RunArgs),
    /// Validates a workflow and prints its schedule.
    Inspect(InspectArgs),
    /// Prints a stored execution and its node logs.
    Status(StatusArgs),
}

impl Cli {
    /// Loads environment variables from .env file (if enabled) and parses CLI arguments.
    ///
    /// The .env file is loaded first so that clap's `env` fallbacks see its
    /// values.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    /// Loads environment variables from .env file if the dotenv feature is enabled.
    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    /// No-op when dotenv feature is disabled.
    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Logs build information at debug level.
    pub fn log_build_info(&self) {
        tracing::debug!(
            target: TRACING_TARGET_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = std::process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            log_format = %self.log.log_format,
            "Build information"
        );
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_arguments_parse() {
        let cli = Cli::try_parse_from([
            "weaver",
            "run",
            "flow.json",
            "--input",
            r#"{"topic":"rust"}"#,
            "--parallel",
            "--strategy",
            "collect",
            "--state-dir",
            "/tmp/weaver",
        ])
        .expect("parses");

        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.workflow.to_str(), Some("flow.json"));
        assert_eq!(args.parallel_override(), Some(true));
        assert_eq!(args.strategy.map(|s| s.to_string()).as_deref(), Some("collect"));
        assert_eq!(args.input_map().expect("input")["topic"], "rust");
    }

    #[test]
    fn test_parallel_flags_conflict() {
        let result = Cli::try_parse_from(["weaver", "run", "flow.json", "--parallel", "--sequential"]);
        assert!(result.is_err());
    }
}
