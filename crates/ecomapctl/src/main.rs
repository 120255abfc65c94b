//! Ecomap Control - inventory, health and port-forward remediation CLI

use clap::Parser;
use ecomapctl::cli::Cli;
use ecomapctl::commands;
use ecomapctl::errors::{error_code, exit_code_for_error, EXIT_SUCCESS};
use ecomapctl::logging::{init_tracing, ErrorDetails, LogEntry};
use owo_colors::OwoColorize;
use std::time::Instant;
use tracing::debug;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let start = Instant::now();
    let req_id = LogEntry::generate_req_id();
    debug!("ecomapctl {} req_id={}", env!("ECOMAP_VERSION"), req_id);

    let (exit_code, error) = match commands::run(&cli).await {
        Ok(code) => (code, None),
        Err(e) => {
            eprintln!("{} {:#}", "[ERROR]".bright_red(), e);
            (
                exit_code_for_error(&e),
                Some(ErrorDetails {
                    code: error_code(&e).to_string(),
                    message: format!("{:#}", e),
                }),
            )
        }
    };

    LogEntry {
        ts: LogEntry::now(),
        req_id,
        command: cli.command.name().to_string(),
        args: std::env::args().skip(1).collect(),
        exit_code,
        duration_ms: start.elapsed().as_millis() as u64,
        ok: exit_code == EXIT_SUCCESS,
        error,
    }
    .write();

    std::process::exit(exit_code);
}
