#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod commands;
mod config;
mod telemetry;

use std::process::ExitCode;

use crate::config::{Cli, Command};

// Tracing target constants
pub const TRACING_TARGET_STARTUP: &str = "weaver_cli::startup";
pub const TRACING_TARGET_COMMAND: &str = "weaver_cli::command";

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(error) => {
            if tracing::enabled!(tracing::Level::ERROR) {
                tracing::error!(
                    target: TRACING_TARGET_COMMAND,
                    error = %error,
                    "command failed"
                );
            }
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

/// Main application entry point.
async fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::init();

    telemetry::init_tracing(&cli.log)?;
    cli.log_build_info();

    match cli.command {
        Command::Run(args) => commands::run(args).await,
        Command::Inspect(args) => commands::inspect(args).await,
        Command::Status(args) => commands::status(args).await,
    }
}
