//! Shardline CLI - Main entry point

use clap::Parser;
use shardline_cli::{Cli, Commands};
use shardline_common::logging::{init_logging, LogConfig, LogLevel};
use std::process;
use tracing::error;

/// Every shard succeeded
const EXIT_COMPLETE: i32 = 0;
/// The command ran but a shard failed or timed out, or it could not finish
const EXIT_FAILURE: i32 = 1;
/// The command was rejected before running
const EXIT_USAGE: i32 = 2;

#[tokio::main]
async fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Handle markdown help generation
    if cli.markdown_help {
        println!("{}", clap_markdown::help_markdown::<Cli>());
        return;
    }

    // Ensure a command is provided
    let Some(command) = cli.command.as_ref() else {
        eprintln!("Error: A subcommand is required");
        eprintln!();
        eprintln!("For more information, try '--help'.");
        process::exit(EXIT_USAGE);
    };

    // Logs go to stderr so stdout only carries the rendered output
    let log_config = LogConfig::console(if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Warn
    });

    // Environment variables take precedence; a malformed one is a usage error
    let log_config = match log_config.merge_vars(|key| std::env::var(key).ok()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(EXIT_USAGE);
        }
    };

    // The guard flushes file output on exit; the CLI works without logging
    let guard = init_logging(&log_config).ok();

    let code = match execute_command(command).await {
        Ok(true) => EXIT_COMPLETE,
        Ok(false) => EXIT_FAILURE,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            if e.is_usage() {
                EXIT_USAGE
            } else {
                EXIT_FAILURE
            }
        }
    };

    if code != EXIT_COMPLETE {
        drop(guard);
        process::exit(code);
    }
}

/// Execute the CLI command, returning whether it fully succeeded
async fn execute_command(command: &Commands) -> shardline_cli::Result<bool> {
    match command {
        Commands::Route {
            keys,
            shards,
            separator,
            format,
        } => {
            shardline_cli::commands::route::run(keys, *shards, separator, *format)?;
            Ok(true)
        }

        Commands::Load(args) => shardline_cli::commands::load::run(args).await,
    }
}
