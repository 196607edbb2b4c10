//! relay CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Unknown identity

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const UNKNOWN_IDENTITY: u8 = 3;
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(
            EnvFilter::from_default_env()
                .add_directive("relay_core=info".parse().unwrap())
                .add_directive("relay_cli=info".parse().unwrap())
                .add_directive("warn".parse().unwrap()),
        )
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Approve(args) => commands::moderation::approve(&cli.data_dir, args),
        Commands::Reject(args) => commands::moderation::reject(&cli.data_dir, args),
        Commands::Block(args) => commands::moderation::block(&cli.data_dir, args),
        Commands::Unblock(args) => commands::moderation::unblock(&cli.data_dir, args),
        Commands::ListPending(args) => commands::list_pending::execute(&cli.data_dir, args),
        Commands::Stats(args) => commands::stats::execute(&cli.data_dir, args),
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    let msg = e.to_string().to_lowercase();

    if msg.contains("not found") || msg.contains("unknown identity") {
        ExitCodes::UNKNOWN_IDENTITY
    } else if msg.contains("argument") || msg.contains("invalid") {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}
